use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use face_gallery_core::gallery::infrastructure::json_embedding_store::JsonEmbeddingStore;
use face_gallery_core::pipeline::face_gallery_service::FaceGalleryService;
use face_gallery_core::shared::config::GalleryConfig;
use face_gallery_core::shared::constants::{IDENTITIES_DIR, MODELS_DIR};
use face_gallery_core::shared::error::FaceGalleryError;
use face_gallery_core::training::infrastructure::json_bundle_repository::JsonBundleRepository;
use face_gallery_core::training::training_coordinator::TrainingCoordinator;

const ENV_HELP: &str = "\
Environment:
  FACE_GALLERY_DATA_DIR                 gallery data directory
  FACE_GALLERY_DETECTION_CONFIDENCE     detector score threshold [0.5]
  FACE_GALLERY_SAMPLE_EVERY_N_FRAMES    enrollment frame stride [2]
  FACE_GALLERY_MIN_FACE_SIZE_PX         smallest accepted face side [80]
  FACE_GALLERY_BLUR_THRESHOLD           minimum Laplacian variance [30]
  FACE_GALLERY_MIN_EMB_SEPARATION       adjacent duplicate distance [0.05]
  FACE_GALLERY_ENROLL_MAX_FACES         samples kept per enrollment [80]
  FACE_GALLERY_FACE_TOLERANCE           reference match distance [0.5]
  FACE_GALLERY_UNKNOWN_PROB_THRESHOLD   unknown below this probability [0.60]
  FACE_GALLERY_UNKNOWN_DIST_THRESHOLD   unknown beyond this centroid distance [0.65]

The distance defaults suit compact 128-d embeddings. ArcFace vectors are
unit length and spread wider; raise the two distance thresholds if known
faces come back unknown.";

/// Enroll identities from video and recognize faces in images.
///
/// Settings come from `FACE_GALLERY_*` environment variables; the flags
/// below override them.
#[derive(Parser)]
#[command(name = "face-gallery", after_help = ENV_HELP)]
struct Cli {
    /// Gallery data directory (identities, models, references).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    detection_confidence: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add samples of an identity from a video, then train in the background.
    Enroll {
        identity: String,
        video: PathBuf,
    },
    /// Identify the face in an image.
    Recognize { image: PathBuf },
    /// Train the classifier now.
    Train,
    /// Show the training status.
    Status,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(if e.is_client_error() { 2 } else { 1 });
    }
}

fn run() -> Result<(), FaceGalleryError> {
    let cli = Cli::parse();
    let config = load_config(&cli);

    match cli.command {
        Command::Enroll { identity, video } => {
            let bytes = read_input(&video)?;
            let service = FaceGalleryService::open(&config, Some(download_progress))?;
            let result = service.enroll(&identity, &bytes)?;
            log::info!("Waiting for background training");
            service.wait_for_training();
            print_json(&result)
        }
        Command::Recognize { image } => {
            let bytes = read_input(&image)?;
            let service = FaceGalleryService::open(&config, Some(download_progress))?;
            print_json(&service.recognize(&bytes)?)
        }
        Command::Train => print_json(&open_coordinator(&config).train_if_needed()),
        Command::Status => print_json(&open_coordinator(&config).status()),
    }
}

fn load_config(cli: &Cli) -> GalleryConfig {
    let mut config = GalleryConfig::from_env();
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(confidence) = cli.detection_confidence {
        config.detection_confidence = confidence;
    }
    log::debug!("Using data directory {}", config.data_dir.display());
    config
}

/// Training and status need no models, only the stores.
fn open_coordinator(config: &GalleryConfig) -> TrainingCoordinator {
    let store = Arc::new(JsonEmbeddingStore::new(config.data_dir.join(IDENTITIES_DIR)));
    TrainingCoordinator::new(
        store,
        Box::new(JsonBundleRepository::new(config.data_dir.join(MODELS_DIR))),
    )
}

fn read_input(path: &Path) -> Result<Vec<u8>, FaceGalleryError> {
    std::fs::read(path).map_err(|e| {
        FaceGalleryError::InvalidInput(format!("cannot read {}: {e}", path.display()))
    })
}

fn print_json(value: &impl Serialize) -> Result<(), FaceGalleryError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| FaceGalleryError::Internal(e.to_string()))?;
    println!("{json}");
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
