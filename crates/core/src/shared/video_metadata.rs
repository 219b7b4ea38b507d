/// Stream properties reported when a media source is opened.
///
/// Still images are a single-frame source with `fps = 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Container estimate; 0 when unknown.
    pub total_frames: usize,
}

impl VideoMetadata {
    pub fn still_image(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: 0.0,
            total_frames: 1,
        }
    }

    pub fn is_still_image(&self) -> bool {
        self.fps == 0.0 && self.total_frames == 1
    }
}
