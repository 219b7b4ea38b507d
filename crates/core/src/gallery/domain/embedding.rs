use serde::{Deserialize, Serialize};

/// Face embedding vector produced by the recognition model.
///
/// Serialized transparently as a JSON array of floats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Euclidean distance. Extra dimensions of the longer vector are ignored.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Element-wise arithmetic mean. `None` for an empty or ragged set.
    pub fn mean(embeddings: &[Embedding]) -> Option<Embedding> {
        let first = embeddings.first()?;
        let dim = first.dim();
        if embeddings.iter().any(|e| e.dim() != dim) {
            return None;
        }

        let mut sum = vec![0.0f64; dim];
        for e in embeddings {
            for (acc, v) in sum.iter_mut().zip(e.values()) {
                *acc += *v as f64;
            }
        }
        let n = embeddings.len() as f64;
        Some(Embedding(sum.into_iter().map(|s| (s / n) as f32).collect()))
    }
}
