use std::fmt;

use serde::{Deserialize, Serialize};

/// How two embeddings of one space are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    /// Straight-line distance on raw vectors.
    Euclidean,
    /// `1 - cos` on unit-normalized vectors.
    Cosine,
}

/// Every embedding space the service knows about. The dimension, metric and
/// threshold of a space are fixed here and never tuned at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelProfile {
    DlibResnet,
    ArcFace,
    Sface,
    Facenet,
    PixelHistogram,
}

impl ModelProfile {
    pub const ALL: [ModelProfile; 5] = [
        ModelProfile::DlibResnet,
        ModelProfile::ArcFace,
        ModelProfile::Sface,
        ModelProfile::Facenet,
        ModelProfile::PixelHistogram,
    ];

    /// Name reported as `model` in responses.
    pub const fn name(self) -> &'static str {
        match self {
            ModelProfile::DlibResnet => "dlib-ResNet",
            ModelProfile::ArcFace => "ArcFace-ONNX",
            ModelProfile::Sface => "SFace-ONNX",
            ModelProfile::Facenet => "Facenet",
            ModelProfile::PixelHistogram => "pixel-histogram",
        }
    }

    pub const fn dimension(self) -> usize {
        match self {
            ModelProfile::DlibResnet => 128,
            ModelProfile::ArcFace => 512,
            ModelProfile::Sface => 128,
            ModelProfile::Facenet => 128,
            ModelProfile::PixelHistogram => 96,
        }
    }

    pub const fn metric(self) -> Metric {
        match self {
            ModelProfile::DlibResnet => Metric::Euclidean,
            _ => Metric::Cosine,
        }
    }

    pub const fn threshold(self) -> f64 {
        match self {
            ModelProfile::DlibResnet => 0.6,
            ModelProfile::ArcFace => 0.38,
            ModelProfile::Sface => 0.35,
            ModelProfile::Facenet => 0.40,
            ModelProfile::PixelHistogram => 0.15,
        }
    }
}

impl fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
