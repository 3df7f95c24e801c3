//! Margin-based binary classifier over observation vectors.
//!
//! A linear model fit by hinge-loss SGD with L2 regularization. Fitting is
//! deterministic: the epoch shuffle uses a caller-supplied seed, so the same
//! training rows always produce the same weights.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Hyperparameters for hinge-loss SGD fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Number of passes over the training rows (default: 60).
    pub epochs: usize,
    /// L2 regularization strength (default: 0.01); the step at update `t`
    /// is `1 / (lambda * t)`.
    pub lambda: f64,
    /// Seed for the epoch shuffle.
    pub seed: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 60,
            lambda: 0.01,
            seed: 7,
        }
    }
}

/// A trained linear margin classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginClassifier {
    weights: Vec<f64>,
    bias: f64,
}

impl MarginClassifier {
    /// Fit a classifier on per-observation rows with ±1 labels.
    ///
    /// Returns `None` when there is nothing to fit: no rows, inconsistent row
    /// widths, or fewer than two distinct label values. A one-class label set
    /// is the designed "insufficient data" state, not an error.
    pub fn fit(xs: &[Vec<f64>], ys: &[i8], config: &FitConfig) -> Option<Self> {
        if xs.is_empty() || xs.len() != ys.len() {
            return None;
        }
        let dim = xs[0].len();
        if dim == 0 || xs.iter().any(|x| x.len() != dim) {
            return None;
        }
        if !(ys.contains(&1) && ys.contains(&-1)) {
            return None;
        }

        let mut weights = vec![0.0; dim];
        let mut bias = 0.0;
        let mut order: Vec<usize> = (0..xs.len()).collect();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut t = 0usize;

        for _ in 0..config.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                t += 1;
                let step = 1.0 / (config.lambda * t as f64);
                let y = f64::from(ys[i]);
                let margin = y * (dot(&weights, &xs[i]) + bias);

                // Pegasos-style update: always shrink, add the example only
                // when it violates the margin.
                let shrink = 1.0 - step * config.lambda;
                for w in &mut weights {
                    *w *= shrink;
                }
                if margin < 1.0 {
                    for (w, &x) in weights.iter_mut().zip(&xs[i]) {
                        *w += step * y * x;
                    }
                    bias += step * y;
                }
            }
        }

        Some(Self { weights, bias })
    }

    /// Predict ±1 for one observation vector.
    ///
    /// A vector of the wrong width votes −1, the majority class, matching the
    /// untrained-context fallback.
    pub fn predict(&self, x: &[f64]) -> i8 {
        if x.len() != self.weights.len() {
            return -1;
        }
        if dot(&self.weights, x) + self.bias > 0.0 {
            1
        } else {
            -1
        }
    }

    /// The decision-margin value for one observation vector.
    pub fn decision(&self, x: &[f64]) -> f64 {
        dot(&self.weights, x) + self.bias
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
