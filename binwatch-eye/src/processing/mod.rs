//! Vision processing pipelines

pub mod detection;
pub mod overlay;

pub use detection::{DetectionPipeline, DetectionResult};
