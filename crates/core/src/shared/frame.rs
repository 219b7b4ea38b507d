use ndarray::ArrayView3;

use crate::shared::region::Region;

/// A single video/image frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque apart from the geometric helpers below.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Rotates the frame by `quarter_turns` × 90° clockwise.
    ///
    /// Odd turn counts swap width and height. The frame index is preserved.
    pub fn rotate_clockwise(&self, quarter_turns: u8) -> Frame {
        let turns = quarter_turns % 4;
        if turns == 0 {
            return self.clone();
        }

        let w = self.width as usize;
        let h = self.height as usize;
        let c = self.channels as usize;
        let (out_w, out_h) = if turns % 2 == 1 { (h, w) } else { (w, h) };

        let mut out = vec![0u8; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let (nx, ny) = match turns {
                    1 => (h - 1 - y, x),
                    2 => (w - 1 - x, h - 1 - y),
                    _ => (y, w - 1 - x),
                };
                let src = (y * w + x) * c;
                let dst = (ny * out_w + nx) * c;
                out[dst..dst + c].copy_from_slice(&self.data[src..src + c]);
            }
        }

        Frame::new(out, out_w as u32, out_h as u32, self.channels, self.index)
    }

    /// Copies the pixels inside `region`, clamped to frame bounds.
    ///
    /// Returns `None` when the clamped region is empty.
    pub fn crop(&self, region: &Region) -> Option<Frame> {
        let fw = self.width as i32;
        let fh = self.height as i32;

        let x1 = region.x.clamp(0, fw) as usize;
        let y1 = region.y.clamp(0, fh) as usize;
        let x2 = (region.x + region.width).clamp(0, fw) as usize;
        let y2 = (region.y + region.height).clamp(0, fh) as usize;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let c = self.channels as usize;
        let row_len = (x2 - x1) * c;
        let mut data = Vec::with_capacity(row_len * (y2 - y1));
        for row in y1..y2 {
            let start = (row * self.width as usize + x1) * c;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Some(Frame::new(
            data,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
            self.channels,
            self.index,
        ))
    }

    /// Luma plane (BT.601 weights) as `f64`, row-major, `width * height` long.
    ///
    /// Single-channel frames are returned as-is.
    pub fn to_grayscale(&self) -> Vec<f64> {
        let c = self.channels as usize;
        if c < 3 {
            return self.data.iter().step_by(c.max(1)).map(|&v| v as f64).collect();
        }
        self.data
            .chunks_exact(c)
            .map(|px| 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64)
            .collect()
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
