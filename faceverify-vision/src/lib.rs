pub mod face;
pub mod model;
pub mod pipeline;
pub mod yunet;

// Re-export commonly used types
pub use face::{ChannelOrder, Detection, Embedding, EncoderInput};
pub use pipeline::{Pipeline, PipelineConfig};
