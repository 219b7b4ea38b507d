pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Embeddings kept per identity; older entries are evicted first.
pub const MAX_EMBEDDINGS_PER_IDENTITY: usize = 400;

/// An identity takes part in training only with at least this many embeddings.
pub const MIN_EMBEDDINGS_FOR_TRAINING: usize = 5;

/// Training needs at least this many eligible identities.
pub const MIN_IDENTITIES_FOR_TRAINING: usize = 2;

/// File extensions accepted in the flat reference gallery.
pub const REFERENCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub const IDENTITIES_DIR: &str = "identities";
pub const MODELS_DIR: &str = "models";
pub const REFERENCES_DIR: &str = "references";
