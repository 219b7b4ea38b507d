use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gallery::domain::embedding::Embedding;

const ITERATIONS: usize = 300;
const LEARNING_RATE: f64 = 1.0;
const REGULARIZATION: f64 = 1e-3;

#[derive(Error, Debug, PartialEq)]
pub enum ClassifierError {
    #[error("need at least 2 classes, got {0}")]
    TooFewClasses(usize),
    #[error("class {0} has no samples")]
    EmptyClass(usize),
    #[error("{samples} samples but {targets} targets")]
    LengthMismatch { samples: usize, targets: usize },
    #[error("target {target} out of range for {classes} classes")]
    TargetOutOfRange { target: usize, classes: usize },
    #[error("expected {expected}-dimensional input, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("inconsistent model: {0}")]
    Inconsistent(String),
}

/// Multinomial kernel logistic regression with an RBF kernel.
///
/// Class weights are balanced (`n / (classes * n_c)`) so that identities
/// with many samples do not drown out the rest. Fitting is deterministic:
/// zero initialization and a fixed number of functional gradient steps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KernelClassifier {
    support: Vec<Embedding>,
    /// One row per support vector, one column per class.
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    gamma: f64,
}

impl KernelClassifier {
    /// Fits on `samples` labelled with class indices `0..n_classes`.
    pub fn fit(
        samples: &[Embedding],
        targets: &[usize],
        n_classes: usize,
    ) -> Result<Self, ClassifierError> {
        if n_classes < 2 {
            return Err(ClassifierError::TooFewClasses(n_classes));
        }
        if samples.len() != targets.len() {
            return Err(ClassifierError::LengthMismatch {
                samples: samples.len(),
                targets: targets.len(),
            });
        }

        let mut counts = vec![0usize; n_classes];
        for &t in targets {
            if t >= n_classes {
                return Err(ClassifierError::TargetOutOfRange {
                    target: t,
                    classes: n_classes,
                });
            }
            counts[t] += 1;
        }
        if let Some(empty) = counts.iter().position(|&c| c == 0) {
            return Err(ClassifierError::EmptyClass(empty));
        }

        let dim = samples[0].dim();
        if let Some(bad) = samples.iter().find(|s| s.dim() != dim) {
            return Err(ClassifierError::DimensionMismatch {
                expected: dim,
                actual: bad.dim(),
            });
        }

        let n = samples.len();
        let x = Array2::from_shape_fn((n, dim), |(i, j)| samples[i].values()[j] as f64);
        let gamma = scale_gamma(&x);
        let kernel = rbf_kernel(&x, gamma);

        let mut one_hot = Array2::<f64>::zeros((n, n_classes));
        for (i, &t) in targets.iter().enumerate() {
            one_hot[[i, t]] = 1.0;
        }
        let weights = Array1::from_iter(
            targets
                .iter()
                .map(|&t| n as f64 / (n_classes as f64 * counts[t] as f64)),
        );
        let total_weight = weights.sum();
        let weights = weights.insert_axis(Axis(1));

        let mut alpha = Array2::<f64>::zeros((n, n_classes));
        let mut intercepts = Array1::<f64>::zeros(n_classes);

        for _ in 0..ITERATIONS {
            let mut probs = kernel.dot(&alpha) + &intercepts;
            softmax_rows(&mut probs);

            let residual = (probs - &one_hot) * &weights / total_weight;
            intercepts -= &(residual.sum_axis(Axis(0)) * LEARNING_RATE);
            let step = (residual + &(&alpha * REGULARIZATION)) * LEARNING_RATE;
            alpha -= &step;
        }

        Ok(Self {
            support: samples.to_vec(),
            coefficients: alpha.rows().into_iter().map(|r| r.to_vec()).collect(),
            intercepts: intercepts.to_vec(),
            gamma,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.intercepts.len()
    }

    pub fn dim(&self) -> usize {
        self.support.first().map_or(0, Embedding::dim)
    }

    /// Checks the shape invariants `fit` establishes. Deserialized models
    /// must pass this before they are used.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        let classes = self.n_classes();
        if classes < 2 {
            return Err(ClassifierError::TooFewClasses(classes));
        }
        if self.support.is_empty() {
            return Err(ClassifierError::Inconsistent("no support vectors".into()));
        }
        if self.coefficients.len() != self.support.len() {
            return Err(ClassifierError::Inconsistent(format!(
                "{} coefficient rows for {} support vectors",
                self.coefficients.len(),
                self.support.len()
            )));
        }
        if let Some(row) = self.coefficients.iter().find(|r| r.len() != classes) {
            return Err(ClassifierError::Inconsistent(format!(
                "coefficient row of length {} for {classes} classes",
                row.len()
            )));
        }
        let dim = self.dim();
        if let Some(bad) = self.support.iter().find(|s| s.dim() != dim) {
            return Err(ClassifierError::DimensionMismatch {
                expected: dim,
                actual: bad.dim(),
            });
        }
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(ClassifierError::Inconsistent(format!(
                "kernel gamma {}",
                self.gamma
            )));
        }
        Ok(())
    }

    /// Class probabilities for `x`, summing to 1.
    pub fn predict_proba(&self, x: &Embedding) -> Result<Vec<f64>, ClassifierError> {
        if x.dim() != self.dim() {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.dim(),
                actual: x.dim(),
            });
        }

        let mut scores = self.intercepts.clone();
        for (sv, coef) in self.support.iter().zip(&self.coefficients) {
            let d = sv.distance(x) as f64;
            let k = (-self.gamma * d * d).exp();
            for (score, c) in scores.iter_mut().zip(coef) {
                *score += k * c;
            }
        }

        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut total = 0.0;
        for s in scores.iter_mut() {
            *s = (*s - max).exp();
            total += *s;
        }
        for s in scores.iter_mut() {
            *s /= total;
        }
        Ok(scores)
    }
}

/// `1 / (dim * var(X))` over all entries; 1 when the data has no spread.
fn scale_gamma(x: &Array2<f64>) -> f64 {
    let var = x.var(0.0);
    let dim = x.ncols() as f64;
    if var > 0.0 && dim > 0.0 {
        1.0 / (dim * var)
    } else {
        1.0
    }
}

fn rbf_kernel(x: &Array2<f64>, gamma: f64) -> Array2<f64> {
    let sq_norms = x.map_axis(Axis(1), |row| row.dot(&row));
    let gram = x.dot(&x.t());
    let mut kernel = Array2::<f64>::zeros(gram.raw_dim());
    for ((i, j), k) in kernel.indexed_iter_mut() {
        let sq_dist = (sq_norms[i] + sq_norms[j] - 2.0 * gram[[i, j]]).max(0.0);
        *k = (-gamma * sq_dist).exp();
    }
    kernel
}

fn softmax_rows(scores: &mut Array2<f64>) {
    for mut row in scores.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let total = row.sum();
        row /= total;
    }
}
