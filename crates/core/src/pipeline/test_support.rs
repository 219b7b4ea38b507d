//! Port doubles shared by the pipeline and gallery tests.
//!
//! Synthetic face frames are 96x96 checkerboards (sharp enough for the blur
//! gate) with a red block in the top-left corner marking "upright" and four
//! signature pixels encoding the embedding. `StubDetector` reports one
//! full-frame face only when the marker sits top-left, so the locator has to
//! find the rotation that restores it.

use std::fs;
use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::gallery::domain::embedding::Embedding;
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

pub const FACE_SIDE: u32 = 96;
const MARKER: [u8; 3] = [255, 0, 0];
const MARKER_SIDE: u32 = 4;
const SIGNATURE_X: u32 = 40;
const SIGNATURE_Y: u32 = 48;
const SIGNATURE_LEN: u32 = 4;
const STUB_IMAGE_MAGIC: &[u8; 4] = b"STUB";

/// Embedding carried by [`face_frame`]: unit vector on `axis`, variant on
/// the last component in steps of 0.1.
pub fn expected_embedding(axis: usize, variant: u8) -> Embedding {
    let mut v = vec![0.0f32; SIGNATURE_LEN as usize];
    v[axis] = 1.0;
    // Same quantization as the signature pixels.
    v[SIGNATURE_LEN as usize - 1] = (variant as f32 * 10.0) / 100.0;
    Embedding::new(v)
}

/// Upright synthetic face for identity `axis` (0, 1 or 2).
pub fn face_frame(axis: usize, variant: u8) -> Frame {
    synthetic_frame(FACE_SIDE, Some(expected_embedding(axis, variant)), true)
}

pub fn small_face_frame() -> Frame {
    synthetic_frame(64, Some(expected_embedding(0, 0)), true)
}

/// Sharp frame without the upright marker in any corner.
pub fn faceless_frame() -> Frame {
    synthetic_frame(FACE_SIDE, None, false)
}

/// Flat grey frame with a marker; fails the blur gate.
pub fn blurry_frame() -> Frame {
    let mut data = vec![128u8; (FACE_SIDE * FACE_SIDE * 3) as usize];
    paint_marker(&mut data, FACE_SIDE);
    Frame::new(data, FACE_SIDE, FACE_SIDE, 3, 0)
}

/// Face the stub embedder cannot encode.
pub fn unencodable_frame() -> Frame {
    let frame = face_frame(0, 0);
    let mut data = frame.data().to_vec();
    let offset = ((SIGNATURE_Y * FACE_SIDE + SIGNATURE_X) * 3) as usize;
    data[offset + 1] = 255;
    Frame::new(data, FACE_SIDE, FACE_SIDE, 3, 0)
}

fn synthetic_frame(side: u32, signature: Option<Embedding>, marker: bool) -> Frame {
    let mut data = Vec::with_capacity((side * side * 3) as usize);
    for y in 0..side {
        for x in 0..side {
            let v = if (x + y) % 2 == 0 { 255 } else { 0 };
            data.extend_from_slice(&[v, v, v]);
        }
    }
    if marker {
        paint_marker(&mut data, side);
    }
    if let Some(embedding) = signature {
        for (i, value) in embedding.values().iter().enumerate() {
            let offset = ((SIGNATURE_Y * side + SIGNATURE_X + i as u32) * 3) as usize;
            data[offset..offset + 3].copy_from_slice(&[(value * 100.0).round() as u8, 0, 0]);
        }
    }
    Frame::new(data, side, side, 3, 0)
}

fn paint_marker(data: &mut [u8], side: u32) {
    for y in 0..MARKER_SIDE {
        for x in 0..MARKER_SIDE {
            let offset = ((y * side + x) * 3) as usize;
            data[offset..offset + 3].copy_from_slice(&MARKER);
        }
    }
}

/// One full-frame face when the marker is in the top-left corner.
pub struct StubDetector;

impl FaceDetector for StubDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if frame.data().len() >= 3 && frame.data()[..3] == MARKER {
            Ok(vec![Region::new(
                0,
                0,
                frame.width() as i32,
                frame.height() as i32,
            )])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Decodes the signature pixels of an upright synthetic face.
pub struct StubEmbedder;

impl FaceEmbedder for StubEmbedder {
    fn embed(
        &self,
        frame: &Frame,
        _face: &Region,
    ) -> Result<Option<Embedding>, Box<dyn std::error::Error>> {
        if frame.width() < SIGNATURE_X + SIGNATURE_LEN || frame.height() <= SIGNATURE_Y {
            return Ok(None);
        }
        let mut values = Vec::with_capacity(SIGNATURE_LEN as usize);
        for i in 0..SIGNATURE_LEN {
            let offset = ((SIGNATURE_Y * frame.width() + SIGNATURE_X + i) * 3) as usize;
            let px = &frame.data()[offset..offset + 3];
            if px[1] != 0 {
                return Ok(None);
            }
            values.push(px[0] as f32 / 100.0);
        }
        Ok(Some(Embedding::new(values)))
    }
}

pub const STUB_VIDEO_BYTES: &[u8] = b"stub-video";

/// Plays back a fixed frame list for files containing [`STUB_VIDEO_BYTES`].
/// An `Err` entry is yielded as a decode error.
pub struct StubVideoReader {
    items: Vec<Result<Frame, String>>,
    opened: bool,
}

impl StubVideoReader {
    pub fn new(items: Vec<Result<Frame, String>>) -> Self {
        Self {
            items,
            opened: false,
        }
    }
}

impl VideoReader for StubVideoReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        if fs::read(path)? != STUB_VIDEO_BYTES {
            return Err("not a stub video".into());
        }
        self.opened = true;
        Ok(VideoMetadata {
            width: FACE_SIDE,
            height: FACE_SIDE,
            fps: 25.0,
            total_frames: self.items.len(),
        })
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        if !self.opened {
            return Box::new(std::iter::once(Err("not opened".into())));
        }
        Box::new(
            self.items
                .drain(..)
                .enumerate()
                .map(|(i, item)| match item {
                    Ok(f) => Ok(Frame::new(f.data().to_vec(), f.width(), f.height(), 3, i)),
                    Err(e) => Err(e.into()),
                }),
        )
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

/// Reads frames stored with [`ImageStubReader::encode`] or
/// [`ImageStubReader::encode_all`]; one record is a still image, several
/// make a clip.
#[derive(Default)]
pub struct ImageStubReader {
    frames: Vec<Frame>,
}

impl ImageStubReader {
    pub fn encode(frame: &Frame) -> Vec<u8> {
        Self::encode_all(std::slice::from_ref(frame))
    }

    pub fn encode_all(frames: &[Frame]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for frame in frames {
            bytes.extend_from_slice(STUB_IMAGE_MAGIC);
            bytes.extend_from_slice(&frame.width().to_le_bytes());
            bytes.extend_from_slice(&frame.height().to_le_bytes());
            bytes.extend_from_slice(frame.data());
        }
        bytes
    }

    pub fn write(path: &Path, frame: &Frame) {
        fs::write(path, Self::encode(frame)).unwrap();
    }
}

impl VideoReader for ImageStubReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        let bytes = fs::read(path)?;
        let mut rest = bytes.as_slice();
        let mut frames = Vec::new();
        while !rest.is_empty() {
            if rest.len() < 12 || &rest[..4] != STUB_IMAGE_MAGIC {
                return Err("not a stub image".into());
            }
            let width = u32::from_le_bytes(rest[4..8].try_into()?);
            let height = u32::from_le_bytes(rest[8..12].try_into()?);
            let len = (width * height * 3) as usize;
            if rest.len() - 12 < len {
                return Err("truncated stub image".into());
            }
            frames.push(Frame::new(rest[12..12 + len].to_vec(), width, height, 3, frames.len()));
            rest = &rest[12 + len..];
        }
        let Some(first) = frames.first() else {
            return Err("empty stub image".into());
        };
        let metadata = if frames.len() == 1 {
            VideoMetadata::still_image(first.width(), first.height())
        } else {
            VideoMetadata {
                width: first.width(),
                height: first.height(),
                fps: 25.0,
                total_frames: frames.len(),
            }
        };
        self.frames = frames;
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        Box::new(self.frames.drain(..).map(Ok))
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}
