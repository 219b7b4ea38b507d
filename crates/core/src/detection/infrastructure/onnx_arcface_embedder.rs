//! ArcFace face embedder using ONNX Runtime.
//!
//! Crops the detected face, resizes it to the model's 112x112 input and
//! returns the L2-normalized output vector.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::detection::infrastructure::math::l2_normalize;
use crate::detection::infrastructure::onnx_session::load_session;
use crate::gallery::domain::embedding::Embedding;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

/// Crops smaller than this on either side carry no usable identity signal.
const MIN_CROP_SIDE: u32 = 8;

pub struct OnnxArcFaceEmbedder {
    session: Mutex<ort::session::Session>,
}

impl OnnxArcFaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl FaceEmbedder for OnnxArcFaceEmbedder {
    fn embed(
        &self,
        frame: &Frame,
        face: &Region,
    ) -> Result<Option<Embedding>, Box<dyn std::error::Error>> {
        let crop = match frame.crop(face) {
            Some(c) if c.width() >= MIN_CROP_SIDE && c.height() >= MIN_CROP_SIDE => c,
            _ => return Ok(None),
        };

        let tensor = preprocess(&crop);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("face embedder produced no outputs".into());
        }
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        Ok(finish_embedding(embedding_slice.to_vec()))
    }
}

/// Normalizes a raw model output, discarding degenerate vectors.
fn finish_embedding(mut raw: Vec<f32>) -> Option<Embedding> {
    if raw.is_empty() || raw.iter().any(|v| !v.is_finite()) || raw.iter().all(|&v| v == 0.0) {
        return None;
    }
    l2_normalize(&mut raw);
    Some(Embedding::new(raw))
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;
    let channels = crop.channels() as usize;
    let data = crop.data();

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * channels;
            for c in 0..3 {
                tensor[[0, c, y, x]] = (data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }

    tensor
}
