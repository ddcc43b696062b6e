//! Full detection pipeline: locator → landmarks → descriptor encoder.
//!
//! All three models must load for the pipeline to exist, which is what the
//! readiness gate relies on: a constructed `FacePipeline` is the proof that
//! the system may start priming and serving authentication attempts.

use crate::encoder::{DescriptorEncoder, EncoderError};
use crate::landmarks::{LandmarkExtractor, LandmarkError};
use crate::locator::{FaceLocator, LocatorError};
use crate::types::{FaceCount, Observation};
use std::path::Path;
use thiserror::Error;

/// File names of the three model resources under the model directory.
pub const LOCATOR_MODEL_FILE: &str = "face_locator.onnx";
pub const LANDMARK_MODEL_FILE: &str = "landmark_68.onnx";
pub const ENCODER_MODEL_FILE: &str = "descriptor_128.onnx";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("locator: {0}")]
    Locator(#[from] LocatorError),
    #[error("landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("encoder: {0}")]
    Encoder(#[from] EncoderError),
}

/// Resolved paths of the three model resources.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub locator: String,
    pub landmarks: String,
    pub encoder: String,
}

impl ModelPaths {
    /// Standard file names resolved against a model directory.
    pub fn in_dir(dir: &Path) -> Self {
        let join = |name: &str| dir.join(name).to_string_lossy().into_owned();
        Self {
            locator: join(LOCATOR_MODEL_FILE),
            landmarks: join(LANDMARK_MODEL_FILE),
            encoder: join(ENCODER_MODEL_FILE),
        }
    }
}

/// The three loaded models, run as one unit.
pub struct FacePipeline {
    locator: FaceLocator,
    landmarks: LandmarkExtractor,
    encoder: DescriptorEncoder,
}

impl FacePipeline {
    /// Load all three models. Any single failure fails the whole pipeline.
    pub fn load(paths: &ModelPaths) -> Result<Self, PipelineError> {
        let locator = FaceLocator::load(&paths.locator)?;
        let landmarks = LandmarkExtractor::load(&paths.landmarks)?;
        let encoder = DescriptorEncoder::load(&paths.encoder)?;
        tracing::info!("face pipeline ready");
        Ok(Self { locator, landmarks, encoder })
    }

    /// Count faces in a frame. Runs the locator only — the periodic monitor
    /// needs box counts, not landmarks or descriptors.
    pub fn count_faces(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<FaceCount, PipelineError> {
        let faces = self.locator.locate(frame, width, height)?;
        Ok(FaceCount::classify(faces.len()))
    }

    /// Run the full pipeline on a frame.
    ///
    /// A descriptor is only computed when exactly one face is present;
    /// zero or multiple faces short-circuit before the heavier models.
    pub fn observe(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Observation, PipelineError> {
        let faces = self.locator.locate(frame, width, height)?;

        match faces.as_slice() {
            [] => Ok(Observation::NoFace),
            [face] => {
                let landmarks = self.landmarks.extract(frame, width, height, face)?;
                let descriptor = self.encoder.encode(frame, width, height, &landmarks)?;
                Ok(Observation::OneFace(descriptor))
            }
            many => Ok(Observation::ManyFaces(many.len())),
        }
    }
}
