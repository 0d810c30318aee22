//! facestamp-core — Face-anchored overlay compositing engine.
//!
//! Detects faces via SCRFD and a 2d106det landmark predictor (both
//! running on ONNX Runtime), computes overlay placements anchored at
//! the nose tip (or a per-user fallback position when no face is
//! found), and alpha-blends a fixed overlay asset onto the photo.

pub mod compositor;
pub mod detector;
pub mod landmarks;
pub mod pipeline;
pub mod placement;
pub mod prefs;
pub mod types;

pub use compositor::OverlayAsset;
pub use detector::FaceDetector;
pub use pipeline::{FaceFinder, Pipeline};
pub use prefs::PreferenceStore;
pub use types::{FaceBox, FaceDetection, OverlayPlacement, VerticalAnchor};

use std::path::PathBuf;

/// Default directory for the ONNX model bundles.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/facestamp/models")
}
