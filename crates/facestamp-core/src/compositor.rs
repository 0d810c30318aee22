//! Overlay compositing.
//!
//! Draws the scaled overlay asset onto a copy of the base photo at
//! each placement rectangle. Off-canvas portions clip; the base image
//! dimensions and uncovered pixels are preserved exactly.

use crate::types::OverlayPlacement;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ImageEncoder, RgbaImage};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("failed to load overlay asset {0}: {1}")]
    AssetLoad(String, String),
    #[error("overlay asset has zero area: {0}x{1}")]
    EmptyAsset(u32, u32),
    #[error("failed to encode png: {0}")]
    Encode(String),
}

/// The fixed decorative overlay, loaded once at startup and shared
/// read-only across all runs.
#[derive(Debug, Clone)]
pub struct OverlayAsset {
    image: RgbaImage,
}

impl OverlayAsset {
    /// Load the asset from disk, converting to RGBA so the alpha
    /// channel is always available for blending.
    pub fn load(path: &Path) -> Result<Self, CompositeError> {
        let image = image::open(path)
            .map_err(|e| CompositeError::AssetLoad(path.display().to_string(), e.to_string()))?
            .to_rgba8();
        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "loaded overlay asset"
        );
        Self::from_image(image)
    }

    pub fn from_image(image: RgbaImage) -> Result<Self, CompositeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CompositeError::EmptyAsset(image.width(), image.height()));
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Alpha-blend the asset onto a copy of `base` at each placement.
///
/// Placements partially or fully outside the canvas draw only their
/// visible portion. Placements that round to zero pixels are skipped.
pub fn render(
    base: &RgbaImage,
    asset: &OverlayAsset,
    placements: &[OverlayPlacement],
) -> RgbaImage {
    let mut canvas = base.clone();

    for placement in placements {
        let width = placement.width.round() as i64;
        let height = placement.height.round() as i64;
        if width <= 0 || height <= 0 {
            tracing::debug!(?placement, "skipping degenerate placement");
            continue;
        }

        let scaled = image::imageops::resize(
            &asset.image,
            width as u32,
            height as u32,
            FilterType::Triangle,
        );
        image::imageops::overlay(
            &mut canvas,
            &scaled,
            placement.x.round() as i64,
            placement.y.round() as i64,
        );
    }

    canvas
}

/// Encode a composited image as PNG, in memory.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CompositeError> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| CompositeError::Encode(e.to_string()))?;
    Ok(buffer)
}
