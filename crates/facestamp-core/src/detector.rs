//! SCRFD face detector via ONNX Runtime.
//!
//! Adapts the SCRFD anchor-free detector (3-stride score/bbox decoding
//! plus NMS) and pairs every surviving box with a nose-tip landmark
//! from the 2d106det predictor. Boxes whose nose tip cannot be
//! resolved are dropped rather than returned without a landmark.

use crate::landmarks::NoseLocator;
use crate::types::{FaceBox, FaceDetection};
use image::imageops::FilterType;
use image::RgbaImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied by the letterbox resize, kept for
/// de-mapping detector coordinates back to the source image.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// Face detector: SCRFD boxes refined with a nose-tip landmark.
pub struct FaceDetector {
    session: Session,
    nose: NoseLocator,
    input_size: usize,
    /// Per-stride output indices [(score, bbox)] for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load both model bundles. Fails fast — a missing or corrupt
    /// model is a startup failure, not a per-request one.
    pub fn load(detector_path: &Path, landmark_path: &Path) -> Result<Self, DetectionError> {
        if !detector_path.exists() {
            return Err(DetectionError::ModelNotFound(
                detector_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(detector_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = %detector_path.display(),
            outputs = ?output_names,
            "loaded SCRFD detector"
        );

        if output_names.len() < 6 {
            return Err(DetectionError::InferenceFailed(format!(
                "SCRFD model requires at least 6 outputs (3 strides x score/bbox), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        let nose = NoseLocator::load(landmark_path)?;

        Ok(Self {
            session,
            nose,
            input_size: SCRFD_INPUT_SIZE,
            stride_indices,
        })
    }

    /// Detect faces in an RGBA photo.
    ///
    /// Returns detections sorted by confidence, each carrying a
    /// resolved nose-tip point. May be empty.
    pub fn detect(&mut self, image: &RgbaImage) -> Result<Vec<FaceDetection>, DetectionError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = self.preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectionError::InferenceFailed(format!("scores stride {stride}: {e}"))
                })?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectionError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
                })?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                self.input_size,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let mut boxes = nms(candidates, SCRFD_NMS_THRESHOLD);
        boxes.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        drop(outputs);

        let nose = &mut self.nose;
        let detections = pair_with_noses(boxes, |bbox| nose.locate(image, bbox))?;

        tracing::debug!(faces = detections.len(), "detection complete");
        Ok(detections)
    }

    /// Letterbox the photo into the square SCRFD input and build a
    /// normalized NCHW RGB tensor. Padding uses the model mean so it
    /// normalizes to zero.
    fn preprocess(&self, image: &RgbaImage) -> (Array4<f32>, LetterboxInfo) {
        let (width, height) = (image.width() as f32, image.height() as f32);
        let side = self.input_size as f32;
        let scale = (side / width).min(side / height);

        let new_w = (width * scale).round().max(1.0) as u32;
        let new_h = (height * scale).round().max(1.0) as u32;
        let pad_x = (side - new_w as f32) / 2.0;
        let pad_y = (side - new_h as f32) / 2.0;

        let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

        let mut tensor =
            Array4::<f32>::zeros((1, 3, self.input_size, self.input_size));
        let pad_x_start = pad_x.floor() as u32;
        let pad_y_start = pad_y.floor() as u32;

        for y in 0..self.input_size as u32 {
            for x in 0..self.input_size as u32 {
                let inside = x >= pad_x_start
                    && x < pad_x_start + new_w
                    && y >= pad_y_start
                    && y < pad_y_start + new_h;
                let [r, g, b] = if inside {
                    let p = resized.get_pixel(x - pad_x_start, y - pad_y_start).0;
                    [p[0] as f32, p[1] as f32, p[2] as f32]
                } else {
                    [SCRFD_MEAN; 3]
                };
                tensor[[0, 0, y as usize, x as usize]] = (r - SCRFD_MEAN) / SCRFD_STD;
                tensor[[0, 1, y as usize, x as usize]] = (g - SCRFD_MEAN) / SCRFD_STD;
                tensor[[0, 2, y as usize, x as usize]] = (b - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (tensor, LetterboxInfo { scale, pad_x, pad_y })
    }
}

/// Resolve the nose tip for every surviving box. A box the landmark
/// capability cannot anchor is dropped, not returned; a capability
/// failure aborts the whole run.
fn pair_with_noses<E>(
    boxes: Vec<FaceBox>,
    mut locate: impl FnMut(&FaceBox) -> Result<Option<(f32, f32)>, E>,
) -> Result<Vec<FaceDetection>, E> {
    let mut detections = Vec::with_capacity(boxes.len());
    for bbox in boxes {
        match locate(&bbox)? {
            Some(nose) => detections.push(FaceDetection { bbox, nose }),
            None => {
                tracing::debug!(
                    x = bbox.x,
                    y = bbox.y,
                    confidence = bbox.confidence,
                    "dropping face without a usable nose-tip landmark"
                );
            }
        }
    }
    Ok(detections)
}

/// Discover score/bbox output ordering by name ("score_8", "bbox_16",
/// ...). Exports with generic numeric names fall back to the standard
/// positional layout: [0-2] = scores, [3-5] = bboxes per stride.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named = SCRFD_STRIDES
        .iter()
        .all(|&s| find("score", s).is_some() && find("bbox", s).is_some());

    if named {
        std::array::from_fn(|i| {
            let stride = SCRFD_STRIDES[i];
            (find("score", stride).unwrap(), find("bbox", stride).unwrap())
        })
    } else {
        tracing::info!(
            ?names,
            "SCRFD output names not recognized, using positional mapping"
        );
        [(0, 3), (1, 4), (2, 5)]
    }
}

/// Decode score/bbox tensors for a single stride into face boxes in
/// source-image coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<FaceBox> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

    let mut boxes = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid) as f32 * stride as f32;
        let anchor_cy = (anchor_idx / grid) as f32 * stride as f32;

        // bbox tensor holds [left, top, right, bottom] anchor offsets
        // in stride units.
        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[off] * stride as f32;
        let y1 = anchor_cy - bboxes[off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[off + 3] * stride as f32;

        // De-map from letterboxed space to source-image space.
        let orig_x1 = (x1 - letterbox.pad_x) / letterbox.scale;
        let orig_y1 = (y1 - letterbox.pad_y) / letterbox.scale;
        let orig_x2 = (x2 - letterbox.pad_x) / letterbox.scale;
        let orig_y2 = (y2 - letterbox.pad_y) / letterbox.scale;

        boxes.push(FaceBox {
            x: orig_x1,
            y: orig_y1,
            width: orig_x2 - orig_x1,
            height: orig_y2 - orig_y1,
            confidence: score,
        });
    }

    boxes
}

/// Non-Maximum Suppression: drop boxes overlapping a higher-confidence
/// box beyond the IoU threshold.
fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(x: f32, y: f32, w: f32, h: f32, conf: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_box(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_box(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_box(5.0, 0.0, 10.0, 10.0, 1.0);
        // intersection 5x10 = 50, union 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let boxes = vec![
            make_box(0.0, 0.0, 100.0, 100.0, 0.9),
            make_box(5.0, 5.0, 100.0, 100.0, 0.8),
            make_box(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let kept = nms(boxes, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_decode_stride_respects_threshold() {
        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        // One anchor above threshold, rest below.
        let grid = 640 / 32;
        let num = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; num];
        scores[0] = 0.9;
        let bboxes = vec![1.0f32; num * 4];

        let boxes = decode_stride(&scores, &bboxes, 32, 640, &letterbox, 0.5);
        assert_eq!(boxes.len(), 1);
        // Anchor (0,0), offsets of 1.0 stride units each side: 64x64 box.
        assert!((boxes[0].width - 64.0).abs() < 1e-4);
        assert!((boxes[0].height - 64.0).abs() < 1e-4);
        assert!((boxes[0].x + 32.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_stride_demaps_letterbox() {
        // Source scaled 0.5x and padded 80px on top: detector-space
        // coordinates must map back through (v - pad) / scale.
        let letterbox = LetterboxInfo {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 80.0,
        };
        let grid = 640 / 32;
        let num = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; num];
        // Anchor at cell (4, 4) for stride 32 → anchor center (128, 128).
        let cell = 4 * grid + 4;
        scores[cell * SCRFD_ANCHORS_PER_CELL] = 0.8;
        let bboxes = vec![1.0f32; num * 4];

        let boxes = decode_stride(&scores, &bboxes, 32, 640, &letterbox, 0.5);
        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        // x1 = 128 - 32 = 96 → (96 - 0) / 0.5 = 192
        assert!((b.x - 192.0).abs() < 1e-3);
        // y1 = 128 - 32 = 96 → (96 - 80) / 0.5 = 32
        assert!((b.y - 32.0).abs() < 1e-3);
        // 64px letterboxed box → 128px in source space
        assert!((b.width - 128.0).abs() < 1e-3);
    }

    #[test]
    fn test_pair_with_noses_drops_unanchored_box() {
        let boxes = vec![
            make_box(0.0, 0.0, 100.0, 100.0, 0.9),
            make_box(300.0, 0.0, 100.0, 100.0, 0.8),
        ];

        // Nose resolvable only for the first box.
        let detections = pair_with_noses(boxes, |b: &FaceBox| {
            if b.x < 100.0 {
                Ok::<_, DetectionError>(Some((50.0, 60.0)))
            } else {
                Ok(None)
            }
        })
        .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].nose, (50.0, 60.0));
        assert!((detections[0].bbox.x).abs() < 1e-6);
    }

    #[test]
    fn test_pair_with_noses_propagates_failure() {
        let boxes = vec![make_box(0.0, 0.0, 100.0, 100.0, 0.9)];
        let err = pair_with_noses(boxes, |_: &FaceBox| {
            Err::<Option<(f32, f32)>, _>(DetectionError::InferenceFailed("landmarks".into()))
        })
        .unwrap_err();
        assert!(matches!(err, DetectionError::InferenceFailed(_)));
    }

    #[test]
    fn test_pair_with_noses_empty() {
        let detections =
            pair_with_noses(vec![], |_: &FaceBox| Ok::<_, DetectionError>(Some((0.0, 0.0))))
                .unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = [
            "score_8", "score_16", "score_32", "bbox_8", "bbox_16", "bbox_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(discover_output_indices(&names), [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_discover_output_indices_shuffled_named() {
        let names: Vec<String> = [
            "bbox_8", "score_8", "bbox_16", "score_16", "bbox_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(discover_output_indices(&names), [(1, 0), (3, 2), (5, 4)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3), (1, 4), (2, 5)]);
    }
}
