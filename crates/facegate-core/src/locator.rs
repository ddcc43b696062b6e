//! Face locator via ONNX Runtime.
//!
//! Runs an SSD-style single-shot face detector: one output tensor of
//! candidate rows `(image_id, label, score, x1, y1, x2, y2)` with corners
//! normalized to the letterboxed input square. Candidates are thresholded,
//! de-duplicated with IoU-based NMS, and mapped back to frame coordinates.

use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const LOCATOR_INPUT_SIZE: usize = 300;
const LOCATOR_MEAN: f32 = 127.5;
const LOCATOR_STD: f32 = 128.0;
const LOCATOR_CONFIDENCE_THRESHOLD: f32 = 0.5;
const LOCATOR_NMS_THRESHOLD: f32 = 0.4;
/// Values per candidate row: (image_id, label, score, x1, y1, x2, y2).
const LOCATOR_ROW_LEN: usize = 7;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
pub(crate) struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

/// SSD-based face locator.
pub struct FaceLocator {
    session: Session,
    input_size: usize,
}

impl FaceLocator {
    /// Load the locator ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, LocatorError> {
        if !Path::new(model_path).exists() {
            return Err(LocatorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face locator model"
        );

        Ok(Self {
            session,
            input_size: LOCATOR_INPUT_SIZE,
        })
    }

    /// Locate faces in a grayscale frame, returning boxes sorted by confidence.
    pub fn locate(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, LocatorError> {
        let (input, letterbox) =
            preprocess_letterbox(frame, width as usize, height as usize, self.input_size);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, rows) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LocatorError::InferenceFailed(format!("candidate rows: {e}")))?;

        let candidates = decode_candidates(
            rows,
            self.input_size,
            &letterbox,
            LOCATOR_CONFIDENCE_THRESHOLD,
        );

        let mut result = nms(candidates, LOCATOR_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(result)
    }
}

/// Preprocess a grayscale frame into a letterboxed NCHW float tensor.
///
/// The frame is scaled to fit the square model input with bilinear
/// interpolation; padding uses the model mean so it normalizes to 0.
pub(crate) fn preprocess_letterbox(
    frame: &[u8],
    width: usize,
    height: usize,
    input_size: usize,
) -> (Array4<f32>, LetterboxInfo) {
    let scale_w = input_size as f32 / width as f32;
    let scale_h = input_size as f32 / height as f32;
    let scale = scale_w.min(scale_h);

    let new_w = (width as f32 * scale).round() as usize;
    let new_h = (height as f32 * scale).round() as usize;
    let pad_x = (input_size - new_w) as f32 / 2.0;
    let pad_y = (input_size - new_h) as f32 / 2.0;

    let letterbox = LetterboxInfo { scale, pad_x, pad_y };

    let resized = resize_bilinear(frame, width, height, new_w, new_h);

    let pad_x_start = pad_x.floor() as usize;
    let pad_y_start = pad_y.floor() as usize;

    let mut tensor = Array4::<f32>::zeros((1, 3, input_size, input_size));

    for y in 0..input_size {
        for x in 0..input_size {
            let pixel = if y >= pad_y_start
                && y < pad_y_start + new_h
                && x >= pad_x_start
                && x < pad_x_start + new_w
            {
                resized[(y - pad_y_start) * new_w + (x - pad_x_start)] as f32
            } else {
                LOCATOR_MEAN
            };

            let normalized = (pixel - LOCATOR_MEAN) / LOCATOR_STD;
            // Grayscale replicated across R, G, B.
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    (tensor, letterbox)
}

/// Resize a grayscale buffer with bilinear interpolation.
pub(crate) fn resize_bilinear(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    let mut dst = vec![0u8; dst_w * dst_h];
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return dst;
    }

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for y in 0..dst_h {
        let src_y = (y as f32 + 0.5) * y_ratio - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, src_h as i32 - 1) as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..dst_w {
            let src_x = (x as f32 + 0.5) * x_ratio - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, src_w as i32 - 1) as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * src_w + x0] as f32;
            let tr = src[y0 * src_w + x1] as f32;
            let bl = src[y1 * src_w + x0] as f32;
            let br = src[y1 * src_w + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            dst[y * dst_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    dst
}

/// Decode SSD candidate rows into frame-space bounding boxes.
///
/// Corner coordinates arrive normalized to [0, 1] over the letterboxed
/// input square and are mapped back to original frame coordinates.
fn decode_candidates(
    rows: &[f32],
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let mut detections = Vec::new();

    for row in rows.chunks_exact(LOCATOR_ROW_LEN) {
        let score = row[2];
        if score <= threshold {
            continue;
        }

        let x1 = row[3] * input_size as f32;
        let y1 = row[4] * input_size as f32;
        let x2 = row[5] * input_size as f32;
        let y2 = row[6] * input_size as f32;

        let orig_x1 = (x1 - letterbox.pad_x) / letterbox.scale;
        let orig_y1 = (y1 - letterbox.pad_y) / letterbox.scale;
        let orig_x2 = (x2 - letterbox.pad_x) / letterbox.scale;
        let orig_y2 = (y2 - letterbox.pad_y) / letterbox.scale;

        if orig_x2 <= orig_x1 || orig_y2 <= orig_y1 {
            continue;
        }

        detections.push(BoundingBox {
            x: orig_x1,
            y: orig_y1,
            width: orig_x2 - orig_x1,
            height: orig_y2 - orig_y1,
            confidence: score,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            if iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union between two bounding boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = a.width * a.height;
    let area_b = b.width * b.height;
    let union_area = area_a + area_b - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf }
    }

    #[test]
    fn iou_identical() {
        let a = make_box(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_disjoint() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_box(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn iou_half_overlap() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_box(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap 5x10 = 50, union 150.
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_overlapping() {
        let detections = vec![
            make_box(0.0, 0.0, 100.0, 100.0, 0.9),
            make_box(5.0, 5.0, 100.0, 100.0, 0.8),
            make_box(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn nms_keeps_disjoint() {
        let detections = vec![
            make_box(0.0, 0.0, 10.0, 10.0, 0.9),
            make_box(50.0, 50.0, 10.0, 10.0, 0.8),
        ];
        assert_eq!(nms(detections, 0.4).len(), 2);
    }

    #[test]
    fn nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn decode_thresholds_and_maps_to_frame_space() {
        // 640x480 frame letterboxed into 300x300: scale = 300/640,
        // vertical padding = (300 - 480 * scale) / 2.
        let scale = 300.0f32 / 640.0;
        let pad_y = (300.0 - (480.0 * scale).round()) / 2.0;
        let letterbox = LetterboxInfo { scale, pad_x: 0.0, pad_y };

        // Row 1 passes the threshold, row 2 does not.
        let rows = [
            0.0, 1.0, 0.9, 0.25, 0.25, 0.75, 0.75, //
            0.0, 1.0, 0.3, 0.1, 0.1, 0.2, 0.2,
        ];
        let boxes = decode_candidates(&rows, 300, &letterbox, 0.5);

        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        assert!((b.confidence - 0.9).abs() < 1e-6);
        // x1 = 0.25 * 300 / scale = 160 in frame space.
        assert!((b.x - 160.0).abs() < 1e-3, "x = {}", b.x);
        assert!((b.width - 320.0).abs() < 1e-3, "width = {}", b.width);
        // y maps back through the vertical padding.
        let expected_y = (0.25 * 300.0 - pad_y) / scale;
        assert!((b.y - expected_y).abs() < 1e-3, "y = {}", b.y);
    }

    #[test]
    fn decode_drops_degenerate_boxes() {
        let letterbox = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        // Inverted corners: x2 < x1.
        let rows = [0.0, 1.0, 0.9, 0.8, 0.2, 0.4, 0.6];
        assert!(decode_candidates(&rows, 300, &letterbox, 0.5).is_empty());
    }

    #[test]
    fn letterbox_coordinate_roundtrip() {
        let width = 320.0f32;
        let height = 240.0f32;
        let scale = (300.0 / width).min(300.0 / height);
        let new_w = (width * scale).round();
        let new_h = (height * scale).round();
        let letterbox = LetterboxInfo {
            scale,
            pad_x: (300.0 - new_w) / 2.0,
            pad_y: (300.0 - new_h) / 2.0,
        };

        let orig = (100.0f32, 50.0f32);
        let boxed = (orig.0 * scale + letterbox.pad_x, orig.1 * scale + letterbox.pad_y);
        let recovered = (
            (boxed.0 - letterbox.pad_x) / letterbox.scale,
            (boxed.1 - letterbox.pad_y) / letterbox.scale,
        );

        assert!((recovered.0 - orig.0).abs() < 0.1);
        assert!((recovered.1 - orig.1).abs() < 0.1);
    }

    #[test]
    fn resize_uniform_stays_uniform() {
        let src = vec![128u8; 100 * 100];
        let dst = resize_bilinear(&src, 100, 100, 37, 53);
        assert_eq!(dst.len(), 37 * 53);
        assert!(dst.iter().all(|&p| p == 128));
    }

    #[test]
    fn resize_preserves_horizontal_gradient_ends() {
        // A left-dark right-bright source keeps that ordering after resize.
        let w = 64usize;
        let h = 8usize;
        let src: Vec<u8> = (0..w * h).map(|i| ((i % w) * 4) as u8).collect();
        let dst = resize_bilinear(&src, w, h, 32, 8);
        assert!(dst[0] < dst[31]);
    }
}
