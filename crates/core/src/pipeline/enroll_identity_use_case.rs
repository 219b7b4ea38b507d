use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::Utc;
use serde::Serialize;

use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::detection::domain::face_locator::{LocatedFace, RotationAwareFaceLocator};
use crate::detection::domain::quality_gate::{QualityGate, RejectReason};
use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::embedding_store::EmbeddingStore;
use crate::gallery::domain::identity_key::IdentityKey;
use crate::pipeline::training_scheduler::TrainingScheduler;
use crate::shared::config::EnrollmentConfig;
use crate::shared::error::FaceGalleryError;
use crate::shared::frame::Frame;
use crate::shared::temp_file::spill_to_temp_file;
use crate::video::domain::image_writer::ImageWriter;
use crate::video::domain::video_reader::{VideoReader, VideoReaderFactory};

const FRAME_CHANNEL_CAPACITY: usize = 8;

/// Per-enrollment debug counters, returned to the caller only.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EnrollmentCounters {
    pub frames_read: usize,
    pub sampled: usize,
    pub blur: usize,
    pub no_single_face: usize,
    pub small_face: usize,
    pub no_encoding: usize,
    pub duplicate: usize,
    pub saved: usize,
    /// Located faces per rotation, keyed by degrees.
    pub rotation_counts: BTreeMap<u16, usize>,
    pub last_blur: Option<f64>,
    pub last_face_box: Option<FaceBox>,
}

impl EnrollmentCounters {
    fn reject(&mut self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::Blur => &mut self.blur,
            RejectReason::NoSingleFace => &mut self.no_single_face,
            RejectReason::SmallFace => &mut self.small_face,
            RejectReason::NoEncoding => &mut self.no_encoding,
            RejectReason::Duplicate => &mut self.duplicate,
        };
        *counter += 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FaceBox {
    pub width: i32,
    pub height: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct EnrollmentResult {
    pub identity: IdentityKey,
    pub saved_count: usize,
    pub total_embeddings: usize,
    pub training_scheduled: bool,
    pub counters: EnrollmentCounters,
    pub config: EnrollmentConfig,
}

struct KeptSample {
    located: LocatedFace,
    embedding: Embedding,
}

/// Turns an identity video into quality-gated embeddings.
///
/// Frames are decoded on a reader thread and pass through the gate in
/// order: stride, sharpness, single face, size, encoding, duplicate. Kept
/// embeddings are appended to the store in one call at the end, after which
/// a background training run is requested.
pub struct EnrollIdentityUseCase {
    video_reader: VideoReaderFactory,
    locator: Arc<RotationAwareFaceLocator>,
    embedder: Arc<dyn FaceEmbedder>,
    store: Arc<dyn EmbeddingStore>,
    image_writer: Arc<dyn ImageWriter>,
    scheduler: Arc<dyn TrainingScheduler>,
    gate: QualityGate,
}

impl EnrollIdentityUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        video_reader: VideoReaderFactory,
        locator: Arc<RotationAwareFaceLocator>,
        embedder: Arc<dyn FaceEmbedder>,
        store: Arc<dyn EmbeddingStore>,
        image_writer: Arc<dyn ImageWriter>,
        scheduler: Arc<dyn TrainingScheduler>,
        config: EnrollmentConfig,
    ) -> Self {
        Self {
            video_reader,
            locator,
            embedder,
            store,
            image_writer,
            scheduler,
            gate: QualityGate::new(config),
        }
    }

    pub fn execute(
        &self,
        identity: &str,
        video: &[u8],
    ) -> Result<EnrollmentResult, FaceGalleryError> {
        let identity = IdentityKey::parse(identity)?;
        let temp = spill_to_temp_file(video)?;

        let mut reader = (self.video_reader)();
        let metadata = reader
            .open(temp.path())
            .map_err(|e| FaceGalleryError::InvalidInput(format!("failed to open video: {e}")))?;
        log::info!(
            "Enrolling {identity} from {}x{} video ({} frames)",
            metadata.width,
            metadata.height,
            metadata.total_frames
        );

        let (frame_tx, frame_rx) =
            crossbeam_channel::bounded::<Result<Frame, String>>(FRAME_CHANNEL_CAPACITY);
        let reader_handle = spawn_reader(reader, frame_tx);
        let (embeddings, counters) = self.collect_samples(&identity, frame_rx);
        if reader_handle.join().is_err() {
            log::error!("Video reader thread panicked");
        }

        let saved_count = embeddings.len();
        let total_embeddings = if embeddings.is_empty() {
            self.store.load(&identity).map(|e| e.len())
        } else {
            self.store.append(&identity, embeddings)
        }
        .map_err(|e| FaceGalleryError::Storage(e.to_string()))?;

        let training_scheduled = self.scheduler.schedule();
        log::info!(
            "Enrolled {identity}: kept {saved_count} of {} sampled frames, {total_embeddings} stored",
            counters.sampled
        );

        Ok(EnrollmentResult {
            identity,
            saved_count,
            total_embeddings,
            training_scheduled,
            counters,
            config: self.gate.config().clone(),
        })
    }

    fn collect_samples(
        &self,
        identity: &IdentityKey,
        frame_rx: crossbeam_channel::Receiver<Result<Frame, String>>,
    ) -> (Vec<Embedding>, EnrollmentCounters) {
        let max_faces = self.gate.config().max_faces;
        let mut counters = EnrollmentCounters::default();
        let mut kept: Vec<Embedding> = Vec::new();

        for item in frame_rx {
            if kept.len() >= max_faces {
                break;
            }
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("Frame decode failed, ending enrollment stream: {e}");
                    break;
                }
            };

            counters.frames_read += 1;
            if !self.gate.is_sampled(counters.frames_read) {
                continue;
            }
            counters.sampled += 1;

            match self.evaluate(&frame, kept.last(), &mut counters) {
                Ok(sample) => {
                    self.save_crop(identity, &sample.located, counters.frames_read);
                    kept.push(sample.embedding);
                    counters.saved += 1;
                }
                Err(reason) => {
                    log::debug!("Frame {} rejected: {reason:?}", counters.frames_read);
                    counters.reject(reason);
                }
            }
        }

        (kept, counters)
    }

    fn evaluate(
        &self,
        frame: &Frame,
        last_kept: Option<&Embedding>,
        counters: &mut EnrollmentCounters,
    ) -> Result<KeptSample, RejectReason> {
        let (score, sharpness) = self.gate.check_sharpness(frame);
        counters.last_blur = Some(score);
        sharpness?;

        let located = match self.locator.locate(frame) {
            Ok(Some(located)) => located,
            Ok(None) => return Err(RejectReason::NoSingleFace),
            Err(e) => {
                log::warn!("Face location failed: {e}");
                return Err(RejectReason::NoSingleFace);
            }
        };
        *counters
            .rotation_counts
            .entry(located.rotation.degrees())
            .or_insert(0) += 1;
        counters.last_face_box = Some(FaceBox {
            width: located.face.width,
            height: located.face.height,
        });
        self.gate.check_size(&located.face)?;

        let embedding = match self.embedder.embed(&located.upright, &located.face) {
            Ok(Some(embedding)) => embedding,
            Ok(None) => return Err(RejectReason::NoEncoding),
            Err(e) => {
                log::warn!("Face embedding failed: {e}");
                return Err(RejectReason::NoEncoding);
            }
        };
        self.gate.check_separation(last_kept, &embedding)?;

        Ok(KeptSample { located, embedding })
    }

    /// Best-effort diagnostic crop; failures never reject the sample.
    fn save_crop(&self, identity: &IdentityKey, located: &LocatedFace, frame_number: usize) {
        let Some(crop) = located.upright.crop(&located.face) else {
            log::warn!("Face box of frame {frame_number} is outside the frame");
            return;
        };
        let file_name = format!(
            "{identity}_{}_{frame_number:05}.jpg",
            Utc::now().format("%Y%m%dT%H%M%S%6f")
        );
        let path = self.store.faces_dir(identity).join(file_name);
        if let Err(e) = self.image_writer.write(&path, &crop) {
            log::warn!("Failed to save face crop {}: {e}", path.display());
        }
    }
}

/// Streams decoded frames until the consumer hangs up or a decode error
/// ends the stream.
fn spawn_reader(
    mut reader: Box<dyn VideoReader>,
    frame_tx: crossbeam_channel::Sender<Result<Frame, String>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for frame_result in reader.frames() {
            let failed = frame_result.is_err();
            if frame_tx.send(frame_result.map_err(|e| e.to_string())).is_err() || failed {
                break;
            }
        }
        reader.close();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::infrastructure::json_embedding_store::JsonEmbeddingStore;
    use crate::pipeline::test_support::{
        blurry_frame, expected_embedding, face_frame, faceless_frame, small_face_frame,
        unencodable_frame, StubDetector, StubEmbedder, StubVideoReader, STUB_VIDEO_BYTES,
    };
    use crate::video::infrastructure::image_file_writer::ImageFileWriter;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingScheduler {
        calls: AtomicUsize,
    }

    impl TrainingScheduler for CountingScheduler {
        fn schedule(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct FailingWriter;

    impl ImageWriter for FailingWriter {
        fn write(&self, _path: &Path, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            Err("disk full".into())
        }
    }

    struct FailingStore;

    impl EmbeddingStore for FailingStore {
        fn load(&self, _: &IdentityKey) -> Result<Vec<Embedding>, Box<dyn std::error::Error>> {
            Err("read-only".into())
        }

        fn append(
            &self,
            _: &IdentityKey,
            _: Vec<Embedding>,
        ) -> Result<usize, Box<dyn std::error::Error>> {
            Err("read-only".into())
        }

        fn identities(&self) -> Result<Vec<IdentityKey>, Box<dyn std::error::Error>> {
            Ok(Vec::new())
        }

        fn faces_dir(&self, identity: &IdentityKey) -> PathBuf {
            std::env::temp_dir().join(identity.as_str())
        }
    }

    struct Harness {
        use_case: EnrollIdentityUseCase,
        store: Arc<JsonEmbeddingStore>,
        scheduler: Arc<CountingScheduler>,
    }

    fn every_frame() -> EnrollmentConfig {
        EnrollmentConfig {
            sample_every_n_frames: 1,
            ..EnrollmentConfig::default()
        }
    }

    fn harness_with(
        root: &Path,
        frames: Vec<Result<Frame, String>>,
        config: EnrollmentConfig,
        store: Option<Arc<dyn EmbeddingStore>>,
        writer: Arc<dyn ImageWriter>,
    ) -> Harness {
        let json_store = Arc::new(JsonEmbeddingStore::new(root.join("identities")));
        let scheduler = Arc::new(CountingScheduler::default());
        let factory: VideoReaderFactory = Arc::new(move || {
            Box::new(StubVideoReader::new(frames.clone())) as Box<dyn VideoReader>
        });
        let use_case = EnrollIdentityUseCase::new(
            factory,
            Arc::new(RotationAwareFaceLocator::new(Box::new(StubDetector))),
            Arc::new(StubEmbedder),
            store.unwrap_or_else(|| json_store.clone() as Arc<dyn EmbeddingStore>),
            writer,
            scheduler.clone(),
            config,
        );
        Harness {
            use_case,
            store: json_store,
            scheduler,
        }
    }

    fn harness(root: &Path, frames: Vec<Frame>, config: EnrollmentConfig) -> Harness {
        harness_with(
            root,
            frames.into_iter().map(Ok).collect(),
            config,
            None,
            Arc::new(ImageFileWriter::new()),
        )
    }

    fn alice_frames(n: u8) -> Vec<Frame> {
        (0..n).map(|v| face_frame(0, v)).collect()
    }

    fn key(s: &str) -> IdentityKey {
        IdentityKey::parse(s).unwrap()
    }

    #[test]
    fn test_enrolls_distinct_frames() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), alice_frames(6), every_frame());

        let result = h.use_case.execute("  Alice ", STUB_VIDEO_BYTES).unwrap();

        assert_eq!(result.identity.as_str(), "alice");
        assert_eq!(result.saved_count, 6);
        assert_eq!(result.total_embeddings, 6);
        assert!(result.training_scheduled);
        assert_eq!(h.scheduler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.counters.frames_read, 6);
        assert_eq!(result.counters.saved, 6);
        assert_eq!(result.counters.rotation_counts.get(&0), Some(&6));
        assert_eq!(
            result.counters.last_face_box,
            Some(FaceBox {
                width: 96,
                height: 96
            })
        );

        let stored = h.store.load(&key("alice")).unwrap();
        assert_eq!(stored[0], expected_embedding(0, 0));
        assert_eq!(stored[5], expected_embedding(0, 5));
    }

    #[test]
    fn test_writes_face_crops() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), alice_frames(3), every_frame());

        h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap();

        let faces_dir = h.store.faces_dir(&key("alice"));
        let mut crops: Vec<_> = std::fs::read_dir(&faces_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        crops.sort_by_key(|name| name[name.len() - 9..].to_string());
        assert_eq!(crops.len(), 3);
        for (name, frame) in crops.iter().zip(["00001", "00002", "00003"]) {
            // alice_<YYYYMMDD>T<HHMMSS><micros>_<frame>.jpg
            let parts: Vec<&str> = name.trim_end_matches(".jpg").split('_').collect();
            assert_eq!(parts.len(), 3, "{name}");
            assert_eq!(parts[0], "alice");
            assert_eq!(parts[1].len(), 21, "{name}");
            assert_eq!(&parts[1][8..9], "T");
            assert_eq!(parts[2], frame);
        }
    }

    #[test]
    fn test_crop_write_failure_keeps_sample() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness_with(
            dir.path(),
            alice_frames(2).into_iter().map(Ok).collect(),
            every_frame(),
            None,
            Arc::new(FailingWriter),
        );

        let result = h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap();

        assert_eq!(result.saved_count, 2);
    }

    #[test]
    fn test_adjacent_duplicate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![face_frame(0, 0), face_frame(0, 0), face_frame(0, 1)];
        let h = harness(dir.path(), frames, every_frame());

        let result = h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap();

        assert_eq!(result.saved_count, 2);
        assert_eq!(result.counters.duplicate, 1);
    }

    #[test]
    fn test_duplicate_check_only_looks_at_last_kept() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![face_frame(0, 0), face_frame(0, 1), face_frame(0, 0)];
        let h = harness(dir.path(), frames, every_frame());

        let result = h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap();

        assert_eq!(result.saved_count, 3);
        assert_eq!(result.counters.duplicate, 0);
    }

    #[test]
    fn test_each_gate_has_its_counter() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            blurry_frame(),
            faceless_frame(),
            small_face_frame(),
            unencodable_frame(),
            face_frame(1, 0),
        ];
        let h = harness(dir.path(), frames, every_frame());

        let c = h.use_case.execute("bob", STUB_VIDEO_BYTES).unwrap().counters;

        assert_eq!(c.sampled, 5);
        assert_eq!(c.blur, 1);
        assert_eq!(c.no_single_face, 1);
        assert_eq!(c.small_face, 1);
        assert_eq!(c.no_encoding, 1);
        assert_eq!(c.duplicate, 0);
        assert_eq!(c.saved, 1);
        assert!(c.last_blur.unwrap() > 30.0);
    }

    #[test]
    fn test_rotated_faces_are_counted_per_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            face_frame(0, 0).rotate_clockwise(1),
            face_frame(0, 1).rotate_clockwise(2),
            face_frame(0, 2),
        ];
        let h = harness(dir.path(), frames, every_frame());

        let result = h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap();

        assert_eq!(result.saved_count, 3);
        let counts = &result.counters.rotation_counts;
        assert_eq!(counts.get(&270), Some(&1));
        assert_eq!(counts.get(&180), Some(&1));
        assert_eq!(counts.get(&0), Some(&1));
    }

    #[test]
    fn test_default_stride_samples_every_second_frame() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), alice_frames(6), EnrollmentConfig::default());

        let result = h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap();

        assert_eq!(result.counters.frames_read, 6);
        assert_eq!(result.counters.sampled, 3);
        let stored = h.store.load(&key("alice")).unwrap();
        assert_eq!(
            stored,
            vec![
                expected_embedding(0, 1),
                expected_embedding(0, 3),
                expected_embedding(0, 5)
            ]
        );
    }

    #[test]
    fn test_stops_at_max_faces() {
        let dir = tempfile::tempdir().unwrap();
        let config = EnrollmentConfig {
            max_faces: 3,
            ..every_frame()
        };
        let h = harness(dir.path(), alice_frames(6), config);

        let result = h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap();

        assert_eq!(result.saved_count, 3);
        assert_eq!(result.counters.frames_read, 3);
        assert_eq!(result.config.max_faces, 3);
    }

    #[test]
    fn test_store_is_capped_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), alice_frames(6), every_frame());
        let prefill = (0..398).map(|i| expected_embedding(2, (i % 20) as u8)).collect();
        h.store.append(&key("alice"), prefill).unwrap();

        let result = h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap();

        assert_eq!(result.total_embeddings, 400);
        let stored = h.store.load(&key("alice")).unwrap();
        assert_eq!(stored.len(), 400);
        assert_eq!(stored.last(), Some(&expected_embedding(0, 5)));
    }

    #[test]
    fn test_decode_error_ends_stream_but_keeps_samples() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            Ok(face_frame(0, 0)),
            Ok(face_frame(0, 1)),
            Err("corrupt packet".to_string()),
            Ok(face_frame(0, 2)),
        ];
        let h = harness_with(
            dir.path(),
            frames,
            every_frame(),
            None,
            Arc::new(ImageFileWriter::new()),
        );

        let result = h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap();

        assert_eq!(result.counters.frames_read, 2);
        assert_eq!(result.saved_count, 2);
    }

    #[test]
    fn test_nothing_kept_still_reports_stored_total() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), vec![faceless_frame()], every_frame());
        h.store
            .append(&key("alice"), vec![expected_embedding(0, 0)])
            .unwrap();

        let result = h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap();

        assert_eq!(result.saved_count, 0);
        assert_eq!(result.total_embeddings, 1);
    }

    #[test]
    fn test_empty_identity_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), alice_frames(1), every_frame());

        let err = h.use_case.execute("   ", STUB_VIDEO_BYTES).unwrap_err();

        assert!(err.is_client_error());
        assert_eq!(h.scheduler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unreadable_video_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), alice_frames(1), every_frame());

        let err = h.use_case.execute("alice", b"not a video").unwrap_err();

        assert!(matches!(err, FaceGalleryError::InvalidInput(_)));
        assert_eq!(h.scheduler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_store_failure_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness_with(
            dir.path(),
            alice_frames(2).into_iter().map(Ok).collect(),
            every_frame(),
            Some(Arc::new(FailingStore)),
            Arc::new(FailingWriter),
        );

        let err = h.use_case.execute("alice", STUB_VIDEO_BYTES).unwrap_err();

        assert!(matches!(err, FaceGalleryError::Storage(_)));
        assert!(!err.is_client_error());
    }
}
