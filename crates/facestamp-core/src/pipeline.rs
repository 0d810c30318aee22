//! Pipeline orchestration: detect → (resolve preference if no face)
//! → place → composite.
//!
//! Each run is an independent unit of work over read-only shared
//! state (the overlay asset and model weights); only the preference
//! store's backing storage is shared mutable state, and it commutes
//! under last-write-wins.

use crate::compositor::{self, CompositeError, OverlayAsset};
use crate::detector::{DetectionError, FaceDetector};
use crate::placement::{self, GeometryError};
use crate::prefs::PreferenceStore;
use crate::types::{FaceDetection, VerticalAnchor};
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detection: {0}")]
    Detection(#[from] DetectionError),
    #[error("placement: {0}")]
    Geometry(#[from] GeometryError),
    #[error("compositing: {0}")]
    Composite(#[from] CompositeError),
}

/// Seam over the detection capability, so orchestration can be tested
/// without model weights.
pub trait FaceFinder {
    fn detect(&mut self, image: &RgbaImage) -> Result<Vec<FaceDetection>, DetectionError>;
}

impl FaceFinder for FaceDetector {
    fn detect(&mut self, image: &RgbaImage) -> Result<Vec<FaceDetection>, DetectionError> {
        FaceDetector::detect(self, image)
    }
}

/// The end-to-end overlay pipeline. Holds the process-wide read-only
/// handles (detector sessions, overlay asset) plus the preference
/// store, and turns one photo into one composited photo per run.
pub struct Pipeline<F> {
    finder: F,
    store: PreferenceStore,
    asset: OverlayAsset,
}

impl<F: FaceFinder> Pipeline<F> {
    pub fn new(finder: F, store: PreferenceStore, asset: OverlayAsset) -> Self {
        Self {
            finder,
            store,
            asset,
        }
    }

    /// Run the pipeline on one photo.
    ///
    /// The preference lookup happens only when no face was detected;
    /// with at least one face the store is never touched.
    pub fn run(&mut self, image: &RgbaImage, user_id: &str) -> Result<RgbaImage, PipelineError> {
        let detections = self.finder.detect(image)?;
        tracing::debug!(user_id, faces = detections.len(), "detection finished");

        let anchor = if detections.is_empty() {
            self.store.get(user_id)
        } else {
            VerticalAnchor::default()
        };

        let placements = placement::compute(
            image.width(),
            image.height(),
            self.asset.width(),
            self.asset.height(),
            &detections,
            anchor,
        )?;

        Ok(compositor::render(image, &self.asset, &placements))
    }

    /// Run the pipeline and encode the result as PNG bytes, ready for
    /// delivery to the caller.
    pub fn run_to_png(&mut self, image: &RgbaImage, user_id: &str) -> Result<Vec<u8>, PipelineError> {
        let composited = self.run(image, user_id)?;
        Ok(compositor::encode_png(&composited)?)
    }
}
