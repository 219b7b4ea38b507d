//! YOLO face detector on ONNX Runtime.
//!
//! Frames are letterboxed to the model's square input, the raw output is
//! decoded into scored boxes and greedy NMS removes overlaps. Surviving boxes
//! are mapped back to frame coordinates and clamped to the frame.

use std::path::Path;

use ndarray::Array4;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::math::bbox_iou;
use crate::detection::infrastructure::onnx_session::load_session;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Used when the model input shape is dynamic.
const DEFAULT_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const NMS_IOU_THRESHOLD: f64 = 0.45;

/// YOLO letterbox fill value.
const PAD_VALUE: f32 = 114.0 / 255.0;

pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Loads the model; the input resolution is read from its NCHW input
    /// shape.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::debug!("Face detector ready: {input_size}px input, confidence {confidence}");
        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let letterbox = Letterbox::fit(frame.width(), frame.height(), self.input_size);
        let input = ort::value::Tensor::from_array(letterbox.tensor(frame))?;
        let outputs = self.session.run(ort::inputs![input])?;
        if outputs.len() == 0 {
            return Err("face detector produced no outputs".into());
        }
        let output = outputs[0].try_extract_array::<f32>()?;
        let data = output.as_slice().ok_or("face detector output is not contiguous")?;

        let mut candidates = decode_output(data, output.shape(), self.confidence)?;
        let faces = nms(&mut candidates, NMS_IOU_THRESHOLD)
            .into_iter()
            .map(|c| letterbox.to_region(&c, frame.width(), frame.height()))
            .filter(|r| r.width > 0 && r.height > 0)
            .collect();
        Ok(faces)
    }
}

/// Aspect-preserving resize into a padded square.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    size: u32,
    scale: f64,
    pad_x: u32,
    pad_y: u32,
    scaled_w: u32,
    scaled_h: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, size: u32) -> Self {
        let target = size as f64;
        let scale = (target / width as f64).min(target / height as f64);
        let scaled_w = ((width as f64 * scale).round() as u32).min(size);
        let scaled_h = ((height as f64 * scale).round() as u32).min(size);
        Self {
            size,
            scale,
            pad_x: (size - scaled_w) / 2,
            pad_y: (size - scaled_h) / 2,
            scaled_w,
            scaled_h,
        }
    }

    /// NCHW float tensor in `[0, 1]`, nearest-neighbour sampled.
    fn tensor(&self, frame: &Frame) -> Array4<f32> {
        let side = self.size as usize;
        let mut tensor = Array4::<f32>::from_elem((1, 3, side, side), PAD_VALUE);
        let src = frame.as_ndarray();
        let max_x = frame.width() as usize - 1;
        let max_y = frame.height() as usize - 1;

        for y in 0..self.scaled_h as usize {
            let sy = ((y as f64 / self.scale) as usize).min(max_y);
            let ty = self.pad_y as usize + y;
            for x in 0..self.scaled_w as usize {
                let sx = ((x as f64 / self.scale) as usize).min(max_x);
                let tx = self.pad_x as usize + x;
                for c in 0..3 {
                    tensor[[0, c, ty, tx]] = src[[sy, sx, c]] as f32 / 255.0;
                }
            }
        }
        tensor
    }

    /// Maps a box in letterbox space back onto the source frame.
    fn to_region(&self, c: &Candidate, frame_w: u32, frame_h: u32) -> Region {
        let unpad_x = |v: f64| (v - self.pad_x as f64) / self.scale;
        let unpad_y = |v: f64| (v - self.pad_y as f64) / self.scale;
        Region::from_corners(
            unpad_x(c.x1),
            unpad_y(c.y1),
            unpad_x(c.x2),
            unpad_y(c.y2),
            frame_w,
            frame_h,
        )
    }
}

/// Scored box in letterbox coordinates.
#[derive(Clone, Debug, PartialEq)]
struct Candidate {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

impl Candidate {
    fn corners(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Reads `[cx, cy, w, h, score, keypoints...]` rows from a `[1, F, N]` or
/// `[1, N, F]` output and keeps those scoring at least `min_score`.
fn decode_output(
    data: &[f32],
    shape: &[usize],
    min_score: f64,
) -> Result<Vec<Candidate>, Box<dyn std::error::Error>> {
    let [_, a, b] = shape else {
        return Err(format!("unexpected face detector output shape {shape:?}").into());
    };
    // Features are the short axis.
    let feature_major = a < b;
    let (count, features) = if feature_major { (*b, *a) } else { (*a, *b) };
    if features < 5 {
        return Ok(Vec::new());
    }
    if data.len() < count * features {
        return Err("face detector output is shorter than its shape".into());
    }

    let value = |row: usize, feature: usize| -> f64 {
        let index = if feature_major {
            feature * count + row
        } else {
            row * features + feature
        };
        data[index] as f64
    };

    Ok((0..count)
        .filter(|&row| value(row, 4) >= min_score)
        .map(|row| {
            let (cx, cy) = (value(row, 0), value(row, 1));
            let (half_w, half_h) = (value(row, 2) / 2.0, value(row, 3) / 2.0);
            Candidate {
                x1: cx - half_w,
                y1: cy - half_h,
                x2: cx + half_w,
                y2: cy + half_h,
                score: value(row, 4),
            }
        })
        .collect())
}

/// Greedy NMS, highest score first.
fn nms(candidates: &mut [Candidate], iou_threshold: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates.iter() {
        let overlaps = kept
            .iter()
            .any(|k| bbox_iou(&k.corners(), &candidate.corners()) > iou_threshold);
        if !overlaps {
            kept.push(candidate.clone());
        }
    }
    kept
}
