//! facegate-core — Face detection, landmark extraction, and descriptor
//! matching.
//!
//! Runs the three-model recognition pipeline (SSD face locator, 68-point
//! landmark extractor, 128-dim descriptor encoder) via ONNX Runtime for CPU
//! inference, and provides the pure nearest-descriptor matcher.

pub mod alignment;
pub mod encoder;
pub mod landmarks;
pub mod locator;
pub mod pipeline;
pub mod types;

pub use pipeline::{FacePipeline, ModelPaths, PipelineError};
pub use types::{
    BoundingBox, Descriptor, FaceCount, MatchResult, Matcher, NearestMatcher, Observation,
    RegisteredIdentity,
};

use std::path::PathBuf;

/// Default model directory: `$XDG_DATA_HOME/facegate/models` (or the
/// equivalent under `$HOME`).
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate/models")
}
