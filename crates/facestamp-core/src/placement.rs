//! Overlay placement geometry.
//!
//! Pure and deterministic: detections (or their absence plus a
//! fallback anchor) in, placement rectangles out. Placements preserve
//! the asset aspect ratio and are never clamped to the canvas; the
//! compositor clips whatever falls outside.

use crate::types::{FaceDetection, OverlayPlacement, VerticalAnchor};
use thiserror::Error;

/// Overlay width relative to the detected face box width.
const FACE_WIDTH_RATIO: f32 = 0.85;
/// Overlay width relative to the image width on the no-face fallback.
const FALLBACK_WIDTH_RATIO: f32 = 0.30;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("base image has zero area: {0}x{1}")]
    ZeroImage(u32, u32),
    #[error("overlay asset has zero area: {0}x{1}")]
    ZeroAsset(u32, u32),
}

/// Compute one placement per detection, anchored top-center at the
/// nose tip; with no detections, exactly one horizontally centered
/// placement whose vertical position follows `anchor`.
pub fn compute(
    image_width: u32,
    image_height: u32,
    asset_width: u32,
    asset_height: u32,
    detections: &[FaceDetection],
    anchor: VerticalAnchor,
) -> Result<Vec<OverlayPlacement>, GeometryError> {
    if image_width == 0 || image_height == 0 {
        return Err(GeometryError::ZeroImage(image_width, image_height));
    }
    if asset_width == 0 || asset_height == 0 {
        return Err(GeometryError::ZeroAsset(asset_width, asset_height));
    }

    let aspect = asset_height as f32 / asset_width as f32;

    if detections.is_empty() {
        let width = image_width as f32 * FALLBACK_WIDTH_RATIO;
        let height = width * aspect;
        let x = image_width as f32 / 2.0 - width / 2.0;
        let y = fallback_y(image_height as f32, height, anchor);
        return Ok(vec![OverlayPlacement {
            x,
            y,
            width,
            height,
        }]);
    }

    Ok(detections
        .iter()
        .map(|d| {
            let width = d.bbox.width * FACE_WIDTH_RATIO;
            let height = width * aspect;
            OverlayPlacement {
                x: d.nose.0 - width / 2.0,
                y: d.nose.1 - height / 2.0,
                width,
                height,
            }
        })
        .collect())
}

/// Vertical position of the fallback placement. The tokens name the
/// height on the image, "100%" being the very top.
fn fallback_y(image_height: f32, overlay_height: f32, anchor: VerticalAnchor) -> f32 {
    match anchor {
        VerticalAnchor::Top => 0.0,
        VerticalAnchor::UpperMiddle => image_height * 0.25 - overlay_height / 2.0,
        VerticalAnchor::Middle => image_height / 2.0 - overlay_height / 2.0,
        VerticalAnchor::Lower => image_height * 0.75 - overlay_height / 2.0,
    }
}
