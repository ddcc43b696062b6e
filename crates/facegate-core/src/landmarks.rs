//! 68-point facial landmark extractor via ONNX Runtime.
//!
//! Runs on a padded face crop and returns landmark positions in frame
//! coordinates. The encoder only needs five canonical points (eye centers,
//! nose tip, mouth corners); those are reduced from the 68-point layout.

use crate::locator::resize_bilinear;
use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const LANDMARK_INPUT_SIZE: usize = 112;
/// Fraction of the box size added on each side before cropping.
const CROP_PADDING: f32 = 0.15;
const LANDMARK_POINTS: usize = 68;

// 68-point layout indices (iBUG annotation scheme).
const LEFT_EYE_RING: std::ops::RangeInclusive<usize> = 36..=41;
const RIGHT_EYE_RING: std::ops::RangeInclusive<usize> = 42..=47;
const NOSE_TIP: usize = 30;
const MOUTH_LEFT: usize = 48;
const MOUTH_RIGHT: usize = 54;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// 68 landmark positions in frame coordinates.
#[derive(Debug, Clone)]
pub struct FaceLandmarks {
    pub points: [(f32, f32); LANDMARK_POINTS],
}

impl FaceLandmarks {
    /// Reduce to the five alignment points:
    /// [left eye center, right eye center, nose tip, left mouth, right mouth].
    pub fn five_points(&self) -> [(f32, f32); 5] {
        [
            ring_center(&self.points, LEFT_EYE_RING),
            ring_center(&self.points, RIGHT_EYE_RING),
            self.points[NOSE_TIP],
            self.points[MOUTH_LEFT],
            self.points[MOUTH_RIGHT],
        ]
    }
}

fn ring_center(points: &[(f32, f32)], ring: std::ops::RangeInclusive<usize>) -> (f32, f32) {
    let mut sx = 0.0f32;
    let mut sy = 0.0f32;
    let mut n = 0usize;
    for i in ring {
        sx += points[i].0;
        sy += points[i].1;
        n += 1;
    }
    (sx / n as f32, sy / n as f32)
}

/// The crop region actually fed to the model, clamped to frame bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CropRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Expand a face box by the crop padding and clamp to the frame.
pub(crate) fn padded_crop(face: &BoundingBox, frame_w: u32, frame_h: u32) -> CropRegion {
    let pad_x = face.width * CROP_PADDING;
    let pad_y = face.height * CROP_PADDING;

    let x1 = (face.x - pad_x).max(0.0);
    let y1 = (face.y - pad_y).max(0.0);
    let x2 = (face.x + face.width + pad_x).min(frame_w as f32);
    let y2 = (face.y + face.height + pad_y).min(frame_h as f32);

    CropRegion {
        x: x1,
        y: y1,
        width: (x2 - x1).max(1.0),
        height: (y2 - y1).max(1.0),
    }
}

/// ONNX landmark extractor.
pub struct LandmarkExtractor {
    session: Session,
}

impl LandmarkExtractor {
    /// Load the landmark ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, LandmarkError> {
        if !Path::new(model_path).exists() {
            return Err(LandmarkError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded landmark model"
        );

        Ok(Self { session })
    }

    /// Extract landmarks for one located face in a grayscale frame.
    pub fn extract(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<FaceLandmarks, LandmarkError> {
        let crop = padded_crop(face, width, height);
        let input = crop_to_tensor(frame, width as usize, &crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmark output: {e}")))?;

        if raw.len() != LANDMARK_POINTS * 2 {
            return Err(LandmarkError::InferenceFailed(format!(
                "expected {} landmark values, got {}",
                LANDMARK_POINTS * 2,
                raw.len()
            )));
        }

        // Model output is crop-relative in [0, 1]; map back to frame space.
        let mut points = [(0.0f32, 0.0f32); LANDMARK_POINTS];
        for (i, point) in points.iter_mut().enumerate() {
            *point = (
                crop.x + raw[i * 2] * crop.width,
                crop.y + raw[i * 2 + 1] * crop.height,
            );
        }

        Ok(FaceLandmarks { points })
    }
}

/// Cut the crop region out of the frame and build the normalized NCHW tensor.
fn crop_to_tensor(frame: &[u8], frame_w: usize, crop: &CropRegion) -> Array4<f32> {
    let frame_h = if frame_w > 0 { frame.len() / frame_w } else { 0 };
    let cx = crop.x.floor() as usize;
    let cy = crop.y.floor() as usize;
    let cw = (crop.width.round() as usize).max(1);
    let ch = (crop.height.round() as usize).max(1);

    // Pixels past the frame edge read as black.
    let mut cropped = vec![0u8; cw * ch];
    for y in 0..ch {
        if cy + y >= frame_h {
            break;
        }
        let row = (cy + y) * frame_w;
        for x in 0..cw {
            if cx + x >= frame_w {
                break;
            }
            cropped[y * cw + x] = frame[row + cx + x];
        }
    }

    let resized = resize_bilinear(&cropped, cw, ch, LANDMARK_INPUT_SIZE, LANDMARK_INPUT_SIZE);

    let size = LANDMARK_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let normalized = resized[y * size + x] as f32 / 255.0;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    tensor
}
