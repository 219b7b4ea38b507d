use std::path::PathBuf;

use serde::Serialize;

/// Quality-gate and sampling knobs for enrollment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnrollmentConfig {
    /// Only every Nth decoded frame is considered.
    pub sample_every_n_frames: usize,
    /// Minimum face bounding box side, in pixels.
    pub min_face_size_px: u32,
    /// Minimum variance of the Laplacian for a frame to count as sharp.
    pub blur_threshold: f64,
    /// Minimum embedding distance to the previously kept sample.
    pub min_embedding_separation: f32,
    /// Stop after this many accepted samples.
    pub max_faces: usize,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            sample_every_n_frames: 2,
            min_face_size_px: 80,
            blur_threshold: 30.0,
            min_embedding_separation: 0.05,
            max_faces: 80,
        }
    }
}

/// Open-set decision and fallback matching knobs for recognition.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecognitionConfig {
    /// Distance tolerance for the flat reference fallback.
    pub face_tolerance: f32,
    /// Classifier probability below which the verdict is unknown.
    pub unknown_prob_threshold: f64,
    /// Centroid distance above which the verdict is unknown.
    pub unknown_dist_threshold: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            face_tolerance: 0.5,
            unknown_prob_threshold: 0.60,
            unknown_dist_threshold: 0.65,
        }
    }
}

/// Process configuration, loaded from `FACE_GALLERY_*` environment variables.
#[derive(Clone, Debug)]
pub struct GalleryConfig {
    /// Root of identities/, models/ and references/.
    pub data_dir: PathBuf,
    /// Face detector confidence threshold.
    pub detection_confidence: f64,
    pub enrollment: EnrollmentConfig,
    pub recognition: RecognitionConfig,
}

impl GalleryConfig {
    /// Load configuration from the process environment with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Missing or unparsable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enroll_defaults = EnrollmentConfig::default();
        let recog_defaults = RecognitionConfig::default();

        let data_dir = lookup("FACE_GALLERY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        Self {
            data_dir,
            detection_confidence: parse_or(&lookup, "FACE_GALLERY_DETECTION_CONFIDENCE", 0.5),
            enrollment: EnrollmentConfig {
                sample_every_n_frames: parse_or(
                    &lookup,
                    "FACE_GALLERY_SAMPLE_EVERY_N_FRAMES",
                    enroll_defaults.sample_every_n_frames,
                )
                .max(1),
                min_face_size_px: parse_or(
                    &lookup,
                    "FACE_GALLERY_MIN_FACE_SIZE_PX",
                    enroll_defaults.min_face_size_px,
                ),
                blur_threshold: parse_or(
                    &lookup,
                    "FACE_GALLERY_BLUR_THRESHOLD",
                    enroll_defaults.blur_threshold,
                ),
                min_embedding_separation: parse_or(
                    &lookup,
                    "FACE_GALLERY_MIN_EMB_SEPARATION",
                    enroll_defaults.min_embedding_separation,
                ),
                max_faces: parse_or(
                    &lookup,
                    "FACE_GALLERY_ENROLL_MAX_FACES",
                    enroll_defaults.max_faces,
                ),
            },
            recognition: RecognitionConfig {
                face_tolerance: parse_or(
                    &lookup,
                    "FACE_GALLERY_FACE_TOLERANCE",
                    recog_defaults.face_tolerance,
                ),
                unknown_prob_threshold: parse_or(
                    &lookup,
                    "FACE_GALLERY_UNKNOWN_PROB_THRESHOLD",
                    recog_defaults.unknown_prob_threshold,
                ),
                unknown_dist_threshold: parse_or(
                    &lookup,
                    "FACE_GALLERY_UNKNOWN_DIST_THRESHOLD",
                    recog_defaults.unknown_dist_threshold,
                ),
            },
        }
    }
}

/// Platform data directory for the gallery.
///
/// - Linux: `$XDG_DATA_HOME/face-gallery` or `~/.local/share/face-gallery`
/// - macOS: `~/Library/Application Support/face-gallery`
/// - Windows: `%APPDATA%/face-gallery`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("face-gallery")
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
