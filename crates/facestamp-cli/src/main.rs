use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facestamp_core::{FaceDetector, OverlayAsset, Pipeline, PreferenceStore};
use std::path::PathBuf;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "facestamp", about = "Overlay a decorative image onto faces in photos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Composite the overlay onto a photo and write the result as PNG
    Overlay {
        /// Input photo
        input: PathBuf,
        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,
        /// User identifier, for the no-face anchor preference
        #[arg(short, long, default_value = "local")]
        user: String,
    },
    /// Detect faces in a photo and print them as JSON
    Faces {
        /// Input photo
        input: PathBuf,
    },
    /// Set the fallback anchor token for a user ("100%", "75%", "50%", "25%")
    SetAnchor {
        /// User identifier
        user: String,
        /// Anchor token
        anchor: String,
    },
    /// Show the fallback anchor for a user
    GetAnchor {
        /// User identifier
        user: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Overlay {
            input,
            output,
            user,
        } => {
            let detector = FaceDetector::load(
                &config.detector_model_path(),
                &config.landmark_model_path(),
            )
            .context("loading detection models")?;
            let asset =
                OverlayAsset::load(&config.overlay_path).context("loading overlay asset")?;
            let store =
                PreferenceStore::open(&config.db_path).context("opening preference store")?;
            let mut pipeline = Pipeline::new(detector, store, asset);

            let photo = image::open(&input)
                .with_context(|| format!("reading {}", input.display()))?
                .to_rgba8();

            let png = pipeline
                .run_to_png(&photo, &user)
                .context("overlay pipeline failed")?;
            std::fs::write(&output, png)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("wrote {}", output.display());
        }
        Commands::Faces { input } => {
            let mut detector = FaceDetector::load(
                &config.detector_model_path(),
                &config.landmark_model_path(),
            )
            .context("loading detection models")?;

            let photo = image::open(&input)
                .with_context(|| format!("reading {}", input.display()))?
                .to_rgba8();

            let detections = detector.detect(&photo).context("detection failed")?;
            println!("{}", serde_json::to_string_pretty(&detections)?);
        }
        Commands::SetAnchor { user, anchor } => {
            let store =
                PreferenceStore::open(&config.db_path).context("opening preference store")?;
            store.set(&user, &anchor)?;
            println!("anchor for {user} set to {anchor}");
        }
        Commands::GetAnchor { user } => {
            let store =
                PreferenceStore::open(&config.db_path).context("opening preference store")?;
            match store.get_token(&user)? {
                Some(token) => println!("{token}"),
                None => println!("{} (default)", store.get(&user).token()),
            }
        }
    }

    Ok(())
}
