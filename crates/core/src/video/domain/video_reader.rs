use std::path::Path;
use std::sync::Arc;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Decodes frames from a video or still-image file.
///
/// Enrollment streams every frame of a clip; recognition and the reference
/// gallery read the single frame of an image.
pub trait VideoReader: Send {
    /// Opens the file and returns its stream properties.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Frames in decode order. A decode error is yielded as an `Err` item.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_>;

    fn close(&mut self);
}

/// Builds a fresh reader per operation; readers hold per-file decoder state.
pub type VideoReaderFactory = Arc<dyn Fn() -> Box<dyn VideoReader> + Send + Sync>;

/// Opens `path` and returns its first frame, for still images.
pub fn read_first_frame(
    reader: &mut dyn VideoReader,
    path: &Path,
) -> Result<Frame, Box<dyn std::error::Error>> {
    reader.open(path)?;
    let frame = reader
        .frames()
        .next()
        .unwrap_or_else(|| Err("image contains no frames".into()));
    reader.close();
    frame
}
