use serde::Serialize;

use crate::gallery::domain::embedding::Embedding;
use crate::shared::config::EnrollmentConfig;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Why a sampled enrollment frame was not kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Blur,
    NoSingleFace,
    SmallFace,
    NoEncoding,
    Duplicate,
}

/// Signal-quality predicates applied to enrollment frames.
///
/// The caller applies them in order (stride, sharpness, single face, size,
/// duplicate) and stops at the first failure.
#[derive(Clone, Debug)]
pub struct QualityGate {
    config: EnrollmentConfig,
}

impl QualityGate {
    pub fn new(config: EnrollmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnrollmentConfig {
        &self.config
    }

    /// `frame_number` counts read frames from 1.
    pub fn is_sampled(&self, frame_number: usize) -> bool {
        frame_number % self.config.sample_every_n_frames.max(1) == 0
    }

    /// Computes the sharpness score and checks it against the blur threshold.
    pub fn check_sharpness(&self, frame: &Frame) -> (f64, Result<(), RejectReason>) {
        let score = laplacian_variance(frame);
        let verdict = if score < self.config.blur_threshold {
            Err(RejectReason::Blur)
        } else {
            Ok(())
        };
        (score, verdict)
    }

    pub fn check_size(&self, face: &Region) -> Result<(), RejectReason> {
        if face.meets_min_size(self.config.min_face_size_px) {
            Ok(())
        } else {
            Err(RejectReason::SmallFace)
        }
    }

    /// Compares only against the immediately previously kept embedding.
    pub fn check_separation(
        &self,
        last_kept: Option<&Embedding>,
        candidate: &Embedding,
    ) -> Result<(), RejectReason> {
        match last_kept {
            Some(prev) if prev.distance(candidate) < self.config.min_embedding_separation => {
                Err(RejectReason::Duplicate)
            }
            _ => Ok(()),
        }
    }
}

/// Variance of the 3x3 Laplacian of the frame's luma plane.
///
/// Borders are reflected without repeating the edge pixel (reflect-101),
/// matching the common OpenCV focus measure.
pub fn laplacian_variance(frame: &Frame) -> f64 {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    if w == 0 || h == 0 {
        return 0.0;
    }

    let gray = frame.to_grayscale();
    let at = |x: isize, y: isize| gray[reflect_101(y, h) * w + reflect_101(x, w)];

    let mut responses = Vec::with_capacity(w * h);
    for y in 0..h as isize {
        for x in 0..w as isize {
            let lap = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            responses.push(lap);
        }
    }

    let n = responses.len() as f64;
    let mean = responses.iter().sum::<f64>() / n;
    responses.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn reflect_101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let n = len as isize;
    let reflected = if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    };
    reflected.clamp(0, n - 1) as usize
}
