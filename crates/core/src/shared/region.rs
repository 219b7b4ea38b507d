/// Axis-aligned face bounding box in pixel coordinates of the frame it was
/// detected in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a region from float corner coordinates, clamped to the frame.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64, frame_w: u32, frame_h: u32) -> Self {
        let fw = frame_w as f64;
        let fh = frame_h as f64;
        let left = x1.clamp(0.0, fw).round() as i32;
        let top = y1.clamp(0.0, fh).round() as i32;
        let right = x2.clamp(0.0, fw).round() as i32;
        let bottom = y2.clamp(0.0, fh).round() as i32;
        Self::new(left, top, (right - left).max(0), (bottom - top).max(0))
    }

    /// True when both sides are at least `min_side` pixels.
    pub fn meets_min_size(&self, min_side: u32) -> bool {
        let min_side = min_side as i64;
        self.width as i64 >= min_side && self.height as i64 >= min_side
    }
}
