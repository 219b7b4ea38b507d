use crate::shared::config::RecognitionConfig;

/// Open-set rejection rule.
///
/// A prediction is unknown when the classifier is not confident enough or
/// the face lies too far from the predicted identity's centroid. A missing
/// centroid counts as infinitely far.
pub fn is_unknown(probability: f64, centroid_distance: Option<f32>, config: &RecognitionConfig) -> bool {
    let too_far = centroid_distance.map_or(true, |d| d > config.unknown_dist_threshold);
    probability < config.unknown_prob_threshold || too_far
}

/// Fallback comparison against a single reference embedding.
pub fn within_tolerance(distance: f32, config: &RecognitionConfig) -> bool {
    distance <= config.face_tolerance
}
