pub mod config;
pub mod error;
pub mod matcher;
pub mod profile;
pub mod provider;
pub mod server;

pub use error::{VerifyError, VerifyResult};
pub use matcher::VerificationResult;
pub use profile::{Metric, ModelProfile};
pub use provider::EmbeddingProvider;

// Re-export vision types for convenience
pub use faceverify_vision::{Detection, Embedding};
