use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::identity_key::IdentityKey;
use crate::training::domain::kernel_classifier::{ClassifierError, KernelClassifier};

/// Everything recognition needs from one training run.
///
/// Bundles are immutable; a training run produces a new one with a fresh
/// `version` and the old one is swapped out wholesale.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelBundle {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub classifier: KernelClassifier,
    /// Class index → identity.
    pub labels: Vec<IdentityKey>,
    pub centroids: BTreeMap<IdentityKey, Embedding>,
}

/// Arg-max identity for one embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub identity: IdentityKey,
    pub probability: f64,
    /// `None` when the bundle has no centroid for the predicted identity.
    pub centroid_distance: Option<f32>,
}

impl ModelBundle {
    /// Fits a bundle on per-identity embedding sets, in the given order.
    pub fn train(
        training_set: &[(IdentityKey, Vec<Embedding>)],
        trained_at: DateTime<Utc>,
    ) -> Result<Self, ClassifierError> {
        let mut samples = Vec::new();
        let mut targets = Vec::new();
        let mut centroids = BTreeMap::new();

        for (class, (identity, embeddings)) in training_set.iter().enumerate() {
            samples.extend(embeddings.iter().cloned());
            targets.extend(std::iter::repeat(class).take(embeddings.len()));
            if let Some(mean) = Embedding::mean(embeddings) {
                centroids.insert(identity.clone(), mean);
            }
        }

        let classifier = KernelClassifier::fit(&samples, &targets, training_set.len())?;

        Ok(Self {
            version: version_id(trained_at),
            trained_at,
            classifier,
            labels: training_set.iter().map(|(k, _)| k.clone()).collect(),
            centroids,
        })
    }

    /// Rejects bundles whose labels, centroids and classifier disagree.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        self.classifier.validate()?;
        let classes = self.classifier.n_classes();
        if self.labels.len() != classes {
            return Err(ClassifierError::Inconsistent(format!(
                "{} labels for {classes} classes",
                self.labels.len()
            )));
        }
        for (identity, centroid) in &self.centroids {
            if !self.labels.contains(identity) {
                return Err(ClassifierError::Inconsistent(format!(
                    "centroid for unknown label {identity}"
                )));
            }
            if centroid.dim() != self.classifier.dim() {
                return Err(ClassifierError::DimensionMismatch {
                    expected: self.classifier.dim(),
                    actual: centroid.dim(),
                });
            }
        }
        Ok(())
    }

    pub fn predict(&self, embedding: &Embedding) -> Result<Prediction, ClassifierError> {
        let probabilities = self.classifier.predict_proba(embedding)?;
        let (best, probability) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, p)| {
                if p > acc.1 {
                    (i, p)
                } else {
                    acc
                }
            });

        let identity = self.labels.get(best).cloned().ok_or_else(|| {
            ClassifierError::Inconsistent(format!("no label for class {best}"))
        })?;
        let centroid_distance = self
            .centroids
            .get(&identity)
            .filter(|c| c.dim() == embedding.dim())
            .map(|c| c.distance(embedding));

        Ok(Prediction {
            identity,
            probability,
            centroid_distance,
        })
    }
}

/// Sortable, filesystem-safe version id derived from the training time.
fn version_id(trained_at: DateTime<Utc>) -> String {
    trained_at.format("%Y%m%dT%H%M%S%6fZ").to_string()
}
