use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, StatusCode};
use serde::Deserialize;

use super::{check_dimension, EmbeddingProvider};
use crate::config::RemoteConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::profile::ModelProfile;
use crate::Embedding;

#[derive(Debug, Deserialize)]
struct RemoteEmbedding {
    embedding: Vec<f32>,
}

/// Delegates extraction to another service speaking the `/get-embedding`
/// protocol (multipart `image` in, `{"embedding": [..]}` out).
pub struct RemoteProvider {
    profile: ModelProfile,
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteProvider {
    pub fn new(cfg: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(cfg.timeout_secs.min(10)))
            .build()
            .context("building http client")?;

        Ok(Self {
            profile: cfg.profile,
            endpoint: format!("{}/get-embedding", cfg.url.trim_end_matches('/')),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    fn profile(&self) -> ModelProfile {
        self.profile
    }

    async fn embed(&self, image: Bytes) -> VerifyResult<Embedding> {
        let part = multipart::Part::stream(image).file_name("face.jpg");
        let form = multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "timed out"
                } else if e.is_connect() {
                    "unreachable"
                } else {
                    "request failed"
                };
                log::warn!("embedding service {} {}: {}", self.endpoint, reason, e);
                VerifyError::Provider(format!("embedding service {reason}"))
            })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST => {
                let detail = response.text().await.unwrap_or_default();
                log::debug!("embedding service rejected image: {}", detail);
                return Err(VerifyError::NoFaceDetected);
            }
            status => {
                log::warn!("embedding service {} returned {}", self.endpoint, status);
                return Err(VerifyError::Provider(format!(
                    "embedding service returned {status}"
                )));
            }
        }

        let body: RemoteEmbedding = response
            .json()
            .await
            .map_err(|e| VerifyError::Provider(format!("malformed embedding response: {e}")))?;

        check_dimension(self.profile, Embedding::new(body.embedding))
    }
}
