use std::path::Path;
use std::sync::Arc;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::detection::domain::face_locator::RotationAwareFaceLocator;
use crate::detection::infrastructure::model_resolver::{self, DETECTOR_MODEL, EMBEDDER_MODEL};
use crate::detection::infrastructure::onnx_arcface_embedder::OnnxArcFaceEmbedder;
use crate::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use crate::gallery::domain::embedding_store::EmbeddingStore;
use crate::gallery::infrastructure::json_embedding_store::JsonEmbeddingStore;
use crate::pipeline::enroll_identity_use_case::{EnrollIdentityUseCase, EnrollmentResult};
use crate::pipeline::infrastructure::thread_training_scheduler::ThreadTrainingScheduler;
use crate::pipeline::recognize_face_use_case::RecognizeFaceUseCase;
use crate::pipeline::training_scheduler::TrainingScheduler;
use crate::recognition::domain::recognition_result::RecognitionResult;
use crate::recognition::infrastructure::directory_reference_gallery::DirectoryReferenceGallery;
use crate::shared::config::GalleryConfig;
use crate::shared::constants::{IDENTITIES_DIR, MODELS_DIR, REFERENCES_DIR};
use crate::shared::error::FaceGalleryError;
use crate::training::domain::training_status::{TrainingOutcome, TrainingStatusReport};
use crate::training::infrastructure::json_bundle_repository::JsonBundleRepository;
use crate::training::training_coordinator::TrainingCoordinator;
use crate::video::domain::image_writer::ImageWriter;
use crate::video::domain::video_reader::{VideoReader, VideoReaderFactory};
use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;
use crate::video::infrastructure::image_file_reader::ImageFileReader;
use crate::video::infrastructure::image_file_writer::ImageFileWriter;

/// The media and inference ports the service is built from.
pub struct GalleryAdapters {
    /// Decodes enrollment clips.
    pub video_reader: VideoReaderFactory,
    /// Decodes query images and reference images.
    pub image_reader: VideoReaderFactory,
    pub detector: Box<dyn FaceDetector>,
    pub embedder: Arc<dyn FaceEmbedder>,
    pub image_writer: Arc<dyn ImageWriter>,
}

impl GalleryAdapters {
    /// YOLO face detector, ArcFace embedder, ffmpeg and `image` codecs.
    ///
    /// Models are looked up in the user cache, then `bundled_dir`, and are
    /// downloaded on first use. `progress` receives `(downloaded, total)`.
    pub fn onnx(
        detection_confidence: f64,
        bundled_dir: Option<&Path>,
        progress: Option<fn(u64, u64)>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let progress_fn = || progress.map(|f| Box::new(f) as model_resolver::ProgressFn);

        log::info!("Resolving model: {}", DETECTOR_MODEL.name);
        let detector_path = model_resolver::resolve(DETECTOR_MODEL, bundled_dir, progress_fn())?;
        log::info!("Resolving model: {}", EMBEDDER_MODEL.name);
        let embedder_path = model_resolver::resolve(EMBEDDER_MODEL, bundled_dir, progress_fn())?;

        Ok(Self {
            video_reader: Arc::new(|| Box::new(FfmpegReader::new()) as Box<dyn VideoReader>),
            image_reader: Arc::new(|| Box::new(ImageFileReader::new()) as Box<dyn VideoReader>),
            detector: Box::new(OnnxYoloDetector::new(&detector_path, detection_confidence)?),
            embedder: Arc::new(OnnxArcFaceEmbedder::new(&embedder_path)?),
            image_writer: Arc::new(ImageFileWriter::new()),
        })
    }
}

/// Enrollment, recognition and training behind one thread-safe handle.
///
/// State lives under `config.data_dir`: `identities/` for embeddings and
/// face crops, `models/` for the trained bundle and `references/` for the
/// flat fallback gallery.
pub struct FaceGalleryService {
    enroll: EnrollIdentityUseCase,
    recognize: RecognizeFaceUseCase,
    coordinator: Arc<TrainingCoordinator>,
    scheduler: Arc<ThreadTrainingScheduler>,
}

impl FaceGalleryService {
    pub fn new(config: &GalleryConfig, adapters: GalleryAdapters) -> Self {
        let data_dir = &config.data_dir;
        let store: Arc<dyn EmbeddingStore> =
            Arc::new(JsonEmbeddingStore::new(data_dir.join(IDENTITIES_DIR)));
        let coordinator = Arc::new(TrainingCoordinator::new(
            store.clone(),
            Box::new(JsonBundleRepository::new(data_dir.join(MODELS_DIR))),
        ));
        let scheduler = Arc::new(ThreadTrainingScheduler::new(coordinator.clone()));
        let locator = Arc::new(RotationAwareFaceLocator::new(adapters.detector));

        let references = Arc::new(DirectoryReferenceGallery::new(
            data_dir.join(REFERENCES_DIR),
            adapters.image_reader.clone(),
            locator.clone(),
            adapters.embedder.clone(),
        ));

        let enroll = EnrollIdentityUseCase::new(
            adapters.video_reader,
            locator.clone(),
            adapters.embedder.clone(),
            store,
            adapters.image_writer,
            scheduler.clone(),
            config.enrollment.clone(),
        );
        let recognize = RecognizeFaceUseCase::new(
            adapters.image_reader,
            locator,
            adapters.embedder,
            coordinator.clone(),
            references,
            config.recognition.clone(),
        );

        Self {
            enroll,
            recognize,
            coordinator,
            scheduler,
        }
    }

    /// Builds the service with the ONNX adapters; see [`GalleryAdapters::onnx`].
    pub fn open(
        config: &GalleryConfig,
        progress: Option<fn(u64, u64)>,
    ) -> Result<Self, FaceGalleryError> {
        let adapters = GalleryAdapters::onnx(config.detection_confidence, None, progress)
            .map_err(|e| FaceGalleryError::Internal(format!("failed to load models: {e}")))?;
        Ok(Self::new(config, adapters))
    }

    /// Adds quality-gated samples of `identity` from a video and schedules
    /// background training.
    pub fn enroll(&self, identity: &str, video: &[u8]) -> Result<EnrollmentResult, FaceGalleryError> {
        self.enroll.execute(identity, video)
    }

    pub fn recognize(&self, image: &[u8]) -> Result<RecognitionResult, FaceGalleryError> {
        self.recognize.execute(image)
    }

    pub fn training_status(&self) -> TrainingStatusReport {
        self.coordinator.status()
    }

    /// Runs training on the calling thread.
    pub fn train_now(&self) -> TrainingOutcome {
        self.coordinator.train_if_needed()
    }

    /// Blocks until background training runs scheduled so far are done.
    pub fn wait_for_training(&self) {
        self.scheduler.wait_idle();
    }
}
