//! Descriptor encoder via ONNX Runtime.
//!
//! Produces 128-dimensional face descriptors from aligned 150×150 face
//! crops. Descriptors are used raw (no L2 normalization): the default 0.6
//! Euclidean acceptance threshold is calibrated against unnormalized output.

use crate::alignment;
use crate::landmarks::FaceLandmarks;
use crate::types::Descriptor;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ENCODER_INPUT_SIZE: usize = 150;
const ENCODER_MEAN: f32 = 127.5;
const ENCODER_STD: f32 = 128.0;
const DESCRIPTOR_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ONNX descriptor encoder.
pub struct DescriptorEncoder {
    session: Session,
}

impl DescriptorEncoder {
    /// Load the encoder ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EncoderError> {
        if !Path::new(model_path).exists() {
            return Err(EncoderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded descriptor encoder model"
        );

        Ok(Self { session })
    }

    /// Encode one face into a descriptor.
    ///
    /// The face is aligned to the canonical 150×150 crop from its landmark
    /// points before encoding.
    pub fn encode(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        landmarks: &FaceLandmarks,
    ) -> Result<Descriptor, EncoderError> {
        let five = landmarks.five_points();
        let aligned = alignment::align_face(frame, width, height, &five);

        let input = Self::preprocess(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        let values: Vec<f32> = raw_data.to_vec();

        if values.len() != DESCRIPTOR_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {DESCRIPTOR_DIM}-dim descriptor, got {}",
                values.len()
            )));
        }

        Ok(Descriptor { values })
    }

    /// Preprocess a 150×150 grayscale aligned crop into a NCHW float tensor.
    fn preprocess(aligned_face: &[u8]) -> Array4<f32> {
        let size = ENCODER_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for y in 0..size {
            for x in 0..size {
                let pixel = aligned_face.get(y * size + x).copied().unwrap_or(0) as f32;

                let normalized = (pixel - ENCODER_MEAN) / ENCODER_STD;
                // Grayscale replicated across R, G, B.
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }

        tensor
    }
}
