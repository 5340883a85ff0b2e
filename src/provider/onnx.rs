use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use faceverify_vision::{EncoderInput, Pipeline, PipelineConfig};

use super::{check_dimension, decode_image, EmbeddingProvider};
use crate::config::OnnxConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::profile::ModelProfile;
use crate::Embedding;

/// Input contract of the recognizer trained for `profile`, if it is one we
/// run locally.
pub fn encoder_input(profile: ModelProfile) -> Option<EncoderInput> {
    match profile {
        ModelProfile::Sface => Some(EncoderInput::SFACE),
        ModelProfile::ArcFace => Some(EncoderInput::ARCFACE),
        ModelProfile::Facenet => Some(EncoderInput::FACENET),
        ModelProfile::DlibResnet | ModelProfile::PixelHistogram => None,
    }
}

/// Refuse a recognizer whose output does not live in `profile`'s space.
fn check_recognizer(profile: ModelProfile, dimension: usize) -> Result<()> {
    if dimension != profile.dimension() {
        anyhow::bail!(
            "recognizer emits {} values but {} expects {}; check recognizer_model",
            dimension,
            profile,
            profile.dimension()
        );
    }
    Ok(())
}

/// YuNet detection plus an ONNX recognizer, run in-process.
pub struct OnnxProvider {
    profile: ModelProfile,
    // ort sessions need exclusive access to run
    pipeline: Arc<Mutex<Pipeline>>,
}

impl OnnxProvider {
    pub fn load(cfg: &OnnxConfig) -> Result<Self> {
        let encoder_input = encoder_input(cfg.profile).with_context(|| {
            format!("{} has no ONNX recognizer; use the remote backend", cfg.profile)
        })?;

        let recognizer_model = cfg
            .recognizer_path()
            .with_context(|| format!("no recognizer model configured for {}", cfg.profile))?;

        let pipeline = Pipeline::load(&PipelineConfig {
            detector_model: cfg.detector_model.clone(),
            recognizer_model,
            encoder_input,
            score_threshold: cfg.score_threshold,
            nms_threshold: cfg.nms_threshold,
        })
        .context("Failed to initialize face recognition pipeline")?;
        check_recognizer(cfg.profile, pipeline.dimension())?;

        Ok(Self {
            profile: cfg.profile,
            pipeline: Arc::new(Mutex::new(pipeline)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxProvider {
    fn profile(&self) -> ModelProfile {
        self.profile
    }

    async fn embed(&self, image: Bytes) -> VerifyResult<Embedding> {
        let pipeline = Arc::clone(&self.pipeline);

        let found = tokio::task::spawn_blocking(move || {
            let img = decode_image(&image)?;
            let mut pipeline = pipeline
                .lock()
                .map_err(|_| VerifyError::Provider("pipeline lock poisoned".into()))?;
            pipeline.extract_embedding(&img).map_err(|e| {
                log::error!("onnx inference failed: {:#}", e);
                VerifyError::Provider(format!("{:#}", e))
            })
        })
        .await
        .map_err(|e| VerifyError::Provider(format!("inference worker failed: {e}")))??;

        let embedding = found.ok_or(VerifyError::NoFaceDetected)?;
        check_dimension(self.profile, embedding)
    }
}
