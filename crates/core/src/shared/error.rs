use thiserror::Error;

/// Errors surfaced at the enrollment / recognition operation boundary.
///
/// Normal recognition outcomes (no face, unknown, no match) are not errors;
/// they are reported through `RecognitionStatus`.
#[derive(Error, Debug)]
pub enum FaceGalleryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl FaceGalleryError {
    /// True for errors caused by the caller's input (4xx-style).
    pub fn is_client_error(&self) -> bool {
        matches!(self, FaceGalleryError::InvalidInput(_))
    }
}
