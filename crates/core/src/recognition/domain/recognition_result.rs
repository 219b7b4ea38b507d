use serde::Serialize;

use crate::detection::domain::face_locator::Rotation;
use crate::gallery::domain::identity_key::IdentityKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionStatus {
    Match,
    Unknown,
    NoMatch,
    NoFace,
    NoKnownFaces,
}

/// Raw values behind a verdict, reported whatever the verdict is.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    /// Distance to the predicted identity's centroid; absent when the bundle
    /// has no centroid for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid_distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted: Option<IdentityKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub status: RecognitionStatus,
    pub identity: Option<IdentityKey>,
    pub confidence: f64,
    pub diagnostics: Diagnostics,
}

impl RecognitionResult {
    pub fn no_face() -> Self {
        Self {
            status: RecognitionStatus::NoFace,
            identity: None,
            confidence: 0.0,
            diagnostics: Diagnostics::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_face_has_zero_confidence() {
        let r = RecognitionResult::no_face();
        assert_eq!(r.status, RecognitionStatus::NoFace);
        assert_eq!(r.confidence, 0.0);
        assert!(r.identity.is_none());
    }

    #[test]
    fn test_json_shape() {
        let r = RecognitionResult {
            status: RecognitionStatus::NoKnownFaces,
            identity: None,
            confidence: 1.0,
            diagnostics: Diagnostics {
                rotation: Some(Rotation::Deg90),
                ..Diagnostics::default()
            },
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "no_known_faces");
        assert!(json["identity"].is_null());
        assert_eq!(json["diagnostics"]["rotation"], 90);
        assert!(json["diagnostics"].get("probability").is_none());
    }
}
