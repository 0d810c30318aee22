//! Nose-tip localisation via the 2d106det landmark predictor.
//!
//! The predictor takes a square face crop resized to 192x192 and emits
//! 106 2-D points normalized to [-1, 1] over the crop. Placement only
//! needs one of them: the nose tip.

use crate::detector::DetectionError;
use crate::types::FaceBox;
use image::imageops::FilterType;
use image::RgbaImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const LANDMARK_INPUT_SIZE: usize = 192;
const LANDMARK_POINTS: usize = 106;
/// Tip-of-the-nose slot in the 2d106det point ordering.
const NOSE_TIP_INDEX: usize = 86;
/// Crop side relative to the longer box side, giving the predictor
/// some context around the detector's tight box.
const CROP_EXPANSION: f32 = 1.5;

/// Landmark predictor reduced to the single point placement consults.
pub struct NoseLocator {
    session: Session,
}

impl NoseLocator {
    pub fn load(model_path: &Path) -> Result<Self, DetectionError> {
        if !model_path.exists() {
            return Err(DetectionError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded 2d106det landmark predictor");

        Ok(Self { session })
    }

    /// Resolve the nose-tip point for one detected face box.
    ///
    /// `Ok(None)` means the predictor produced no usable point for
    /// this box (truncated or non-finite output); the caller drops the
    /// detection. Inference failure is an error for the whole run.
    pub fn locate(
        &mut self,
        image: &RgbaImage,
        face: &FaceBox,
    ) -> Result<Option<(f32, f32)>, DetectionError> {
        let crop = square_crop(face);
        let input = crop_tensor(image, &crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, points) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectionError::InferenceFailed(format!("landmarks: {e}")))?;

        Ok(nose_from_output(points, &crop))
    }
}

/// Pick the nose tip out of a raw predictor output and map it into
/// image coordinates. `None` for truncated or non-finite output — the
/// caller drops that detection rather than anchoring it nowhere.
fn nose_from_output(points: &[f32], crop: &CropRegion) -> Option<(f32, f32)> {
    let off = NOSE_TIP_INDEX * 2;
    if points.len() < LANDMARK_POINTS * 2 || off + 1 >= points.len() {
        return None;
    }

    let (nx, ny) = (points[off], points[off + 1]);
    if !nx.is_finite() || !ny.is_finite() {
        return None;
    }

    // Predictor output is normalized to [-1, 1] over the crop.
    let x = crop.x + (nx + 1.0) * crop.side / 2.0;
    let y = crop.y + (ny + 1.0) * crop.side / 2.0;
    Some((x, y))
}

/// Square crop region centered on a face box. May extend outside the
/// image; sampling clamps to the nearest edge pixel.
struct CropRegion {
    x: f32,
    y: f32,
    side: f32,
}

fn square_crop(face: &FaceBox) -> CropRegion {
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;
    let side = (face.width.max(face.height) * CROP_EXPANSION).max(1.0);
    CropRegion {
        x: cx - side / 2.0,
        y: cy - side / 2.0,
        side,
    }
}

/// Extract the crop, resize to the predictor input and build a NCHW
/// RGB tensor. 2d106det takes raw 0-255 pixel values, no normalization.
fn crop_tensor(image: &RgbaImage, crop: &CropRegion) -> Array4<f32> {
    let side_px = crop.side.round().max(1.0) as u32;
    let mut patch = RgbaImage::new(side_px, side_px);

    let max_x = image.width().saturating_sub(1) as f32;
    let max_y = image.height().saturating_sub(1) as f32;
    for y in 0..side_px {
        for x in 0..side_px {
            let sx = (crop.x + x as f32).clamp(0.0, max_x) as u32;
            let sy = (crop.y + y as f32).clamp(0.0, max_y) as u32;
            patch.put_pixel(x, y, *image.get_pixel(sx, sy));
        }
    }

    let resized = image::imageops::resize(
        &patch,
        LANDMARK_INPUT_SIZE as u32,
        LANDMARK_INPUT_SIZE as u32,
        FilterType::Triangle,
    );

    let mut tensor = Array4::<f32>::zeros((1, 3, LANDMARK_INPUT_SIZE, LANDMARK_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel.0[0] as f32;
        tensor[[0, 1, y as usize, x as usize]] = pixel.0[1] as f32;
        tensor[[0, 2, y as usize, x as usize]] = pixel.0[2] as f32;
    }
    tensor
}
