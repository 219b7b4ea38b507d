use std::path::Path;

use crate::shared::frame::Frame;

/// Persists a frame (typically a face crop) as an image file.
///
/// The format follows the path's extension.
pub trait ImageWriter: Send + Sync {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;
}
