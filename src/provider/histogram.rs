use async_trait::async_trait;
use bytes::Bytes;
use image::{imageops::FilterType, DynamicImage};

use super::{check_dimension, decode_image, EmbeddingProvider};
use crate::error::{VerifyError, VerifyResult};
use crate::profile::ModelProfile;
use crate::Embedding;

const THUMB_SIDE: u32 = 8;
const BINS: usize = 32;
/// Histograms are taken on a downscaled copy to bound the cost of huge uploads.
const HISTOGRAM_SIDE: u32 = 256;

/// Coarse pixel features: an 8x8 grayscale thumbnail followed by a 32-bin
/// intensity histogram. Needs no model files and does no face detection, so
/// every decodable image yields an embedding.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramProvider;

impl HistogramProvider {
    pub fn features(img: &DynamicImage) -> Embedding {
        let thumb = img
            .resize_exact(THUMB_SIDE, THUMB_SIDE, FilterType::Triangle)
            .to_luma8();
        let mut values: Vec<f32> = thumb.pixels().map(|p| p[0] as f32 / 255.0).collect();

        let gray = img
            .resize(HISTOGRAM_SIDE, HISTOGRAM_SIDE, FilterType::Nearest)
            .to_luma8();
        let mut bins = [0u32; BINS];
        for p in gray.pixels() {
            bins[p[0] as usize * BINS / 256] += 1;
        }
        let total = gray.pixels().len().max(1) as f32;
        values.extend(bins.iter().map(|&count| count as f32 / total));

        Embedding::new(values)
    }
}

#[async_trait]
impl EmbeddingProvider for HistogramProvider {
    fn profile(&self) -> ModelProfile {
        ModelProfile::PixelHistogram
    }

    async fn embed(&self, image: Bytes) -> VerifyResult<Embedding> {
        let embedding = tokio::task::spawn_blocking(move || {
            decode_image(&image).map(|img| Self::features(&img))
        })
        .await
        .map_err(|e| VerifyError::Provider(format!("histogram worker failed: {e}")))??;

        check_dimension(self.profile(), embedding)
    }
}
