use thiserror::Error;

pub type VerifyResult<T> = Result<T, VerifyError>;

/// Everything that can go wrong between receiving two inputs and producing a
/// verdict.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Malformed embeddings: empty, non-finite, or of different lengths.
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("no face detected")]
    NoFaceDetected,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("embedding provider failed: {0}")]
    Provider(String),
}

impl VerifyError {
    /// Client errors are the caller's to fix and are not worth retrying.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, VerifyError::Provider(_))
    }
}

impl From<image::ImageError> for VerifyError {
    fn from(err: image::ImageError) -> Self {
        VerifyError::InvalidImage(err.to_string())
    }
}
