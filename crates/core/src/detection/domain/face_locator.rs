use std::sync::{Mutex, PoisonError};

use serde::{Serialize, Serializer};

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Clockwise rotation applied to a frame before detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Search order of the locator.
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    pub fn quarter_turns(self) -> u8 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 1,
            Rotation::Deg180 => 2,
            Rotation::Deg270 => 3,
        }
    }

    pub fn degrees(self) -> u16 {
        self.quarter_turns() as u16 * 90
    }
}

impl Serialize for Rotation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.degrees())
    }
}

/// A frame turned upright with its single detected face.
#[derive(Clone, Debug)]
pub struct LocatedFace {
    pub upright: Frame,
    pub face: Region,
    pub rotation: Rotation,
}

/// Finds exactly one face by trying 0°, 90°, 180° and 270° clockwise.
///
/// First match wins: the first rotation at which the detector reports
/// exactly one face is returned, even if a later rotation would detect it
/// with higher confidence.
pub struct RotationAwareFaceLocator {
    detector: Mutex<Box<dyn FaceDetector>>,
}

impl RotationAwareFaceLocator {
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self {
            detector: Mutex::new(detector),
        }
    }

    /// Returns `Ok(None)` when no rotation yields exactly one face.
    ///
    /// A detector error at a single rotation is logged and counts as
    /// "not exactly one face" for that rotation. A detector that panicked
    /// on another thread stays usable.
    pub fn locate(&self, frame: &Frame) -> Result<Option<LocatedFace>, Box<dyn std::error::Error>> {
        // A panic inside `detect` leaves no partial state behind.
        let mut detector = self.detector.lock().unwrap_or_else(PoisonError::into_inner);

        for rotation in Rotation::ALL {
            let candidate = frame.rotate_clockwise(rotation.quarter_turns());
            let faces = match detector.detect(&candidate) {
                Ok(faces) => faces,
                Err(e) => {
                    log::warn!(
                        "Face detection failed at {}°: {e}",
                        rotation.degrees()
                    );
                    continue;
                }
            };
            if let [face] = faces.as_slice() {
                return Ok(Some(LocatedFace {
                    face: *face,
                    upright: candidate,
                    rotation,
                }));
            }
        }

        Ok(None)
    }
}
