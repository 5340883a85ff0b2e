use std::path::PathBuf;

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::face::{self, Detection, Embedding, EncoderInput};

/// Everything needed to build a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    pub encoder_input: EncoderInput,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

/// Full pipeline: detect faces → align → encode
pub struct Pipeline {
    detector: Session,
    encoder: Session,
    encoder_input: EncoderInput,
    dimension: usize,
    score_threshold: f32,
    nms_threshold: f32,
}

impl Pipeline {
    /// Load both models and run the recognizer once on a blank face, so a
    /// model that does not accept `encoder_input` fails here, not per request.
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let mut encoder = crate::model::load_session(&config.recognizer_model, "recognizer")?;
        let detector = crate::model::load_session(&config.detector_model, "detector")?;

        let size = config.encoder_input.size;
        let blank = DynamicImage::new_rgb8(size, size);
        let warmup = face::encode_face(&mut encoder, &blank, config.encoder_input)
            .with_context(|| {
                format!(
                    "recognizer {} rejected a {}x{} input",
                    config.recognizer_model.display(),
                    size,
                    size
                )
            })?;
        log::debug!("recognizer emits {} values", warmup.len());

        Ok(Self {
            detector,
            encoder,
            encoder_input: config.encoder_input,
            dimension: warmup.len(),
            score_threshold: config.score_threshold,
            nms_threshold: config.nms_threshold,
        })
    }

    /// Length of the embeddings this pipeline produces.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Detect the best face and encode it. `Ok(None)` means no face was found.
    pub fn process_image(&mut self, img: &DynamicImage) -> Result<Option<(Detection, Embedding)>> {
        let detections = face::detect_faces(
            &mut self.detector,
            img,
            self.score_threshold,
            self.nms_threshold,
        )
        .context("detecting faces")?;

        let Some(best) = detections
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
        else {
            return Ok(None);
        };

        let face_img =
            face::align_face(img, &best, self.encoder_input.size).context("aligning face")?;
        let embedding = face::encode_face(&mut self.encoder, &face_img, self.encoder_input)
            .context("encoding face")?;

        Ok(Some((best, embedding)))
    }

    pub fn extract_embedding(&mut self, img: &DynamicImage) -> Result<Option<Embedding>> {
        Ok(self.process_image(img)?.map(|(_, embedding)| embedding))
    }
}
