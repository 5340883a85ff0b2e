//! Embedding providers.
//!
//! A provider turns an encoded image into an [`Embedding`] of its
//! [`ModelProfile`]'s space. Providers are built once from configuration and
//! shared between requests.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;

use crate::config::ProviderConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::profile::ModelProfile;
use crate::Embedding;

pub mod histogram;
pub mod onnx;
pub mod remote;

pub use histogram::HistogramProvider;
pub use onnx::OnnxProvider;
pub use remote::RemoteProvider;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn profile(&self) -> ModelProfile;

    /// Embed the single best face in `image`.
    async fn embed(&self, image: Bytes) -> VerifyResult<Embedding>;

    fn ready(&self) -> bool {
        true
    }
}

/// Build the provider named by `config`, loading any models up front.
pub fn from_config(config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config {
        ProviderConfig::Onnx(cfg) => Arc::new(OnnxProvider::load(cfg)?),
        ProviderConfig::Remote(cfg) => Arc::new(RemoteProvider::new(cfg)?),
        ProviderConfig::Histogram => Arc::new(HistogramProvider),
    };
    log::info!("embedding provider ready: {}", provider.profile());
    Ok(provider)
}

pub(crate) fn decode_image(bytes: &[u8]) -> VerifyResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(VerifyError::InvalidImage("empty upload".into()));
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Reject provider output that does not belong to `profile`'s space.
pub(crate) fn check_dimension(
    profile: ModelProfile,
    embedding: Embedding,
) -> VerifyResult<Embedding> {
    if embedding.len() != profile.dimension() {
        return Err(VerifyError::Provider(format!(
            "{} produced {} values, expected {}",
            profile,
            embedding.len(),
            profile.dimension()
        )));
    }
    Ok(embedding)
}
