use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite preference database.
    pub db_path: PathBuf,
    /// Path to the overlay asset image.
    pub overlay_path: PathBuf,
}

impl Config {
    /// Load configuration from `FACESTAMP_*` environment variables
    /// with XDG-aware defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACESTAMP_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facestamp_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facestamp");

        let db_path = std::env::var("FACESTAMP_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("preferences.db"));

        let overlay_path = std::env::var("FACESTAMP_OVERLAY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("overlay.png"));

        Self {
            model_dir,
            db_path,
            overlay_path,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the 2d106det landmark model.
    pub fn landmark_model_path(&self) -> PathBuf {
        self.model_dir.join("2d106det.onnx")
    }
}
