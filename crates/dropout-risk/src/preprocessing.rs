//! Input standardization for models that are sensitive to feature scale.
//!
//! Provides a per-column mean/std [`Scaler`] fitted on training rows. Tree models
//! do not need it; the neural network stores its own scaler and applies it to
//! every row it scores.
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::schema::FEATURE_COUNT;

/// Simple standard scaler (per-column mean/std).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: [f64; FEATURE_COUNT],
    pub std: [f64; FEATURE_COUNT],
}

impl Scaler {
    /// Minimum stddev to avoid division by zero when transforming.
    const MIN_STD: f64 = 1e-6;

    pub fn transform(&self, row: &[f64]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (c, slot) in out.iter_mut().enumerate() {
            let v = row.get(c).copied().unwrap_or(0.0);
            *slot = (v - self.mean[c]) / self.std[c];
        }
        out
    }
}

/// Fit a `Scaler` on rows of features. An empty input yields the identity scaler.
pub fn fit_scaler(rows: &[[f64; FEATURE_COUNT]]) -> Scaler {
    if rows.is_empty() {
        return Scaler {
            mean: [0.0; FEATURE_COUNT],
            std: [1.0; FEATURE_COUNT],
        };
    }

    let n = rows.len() as f64;
    let mut mean = [0.0; FEATURE_COUNT];
    for row in rows {
        for (m, v) in mean.iter_mut().zip(row) {
            *m += v;
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }

    let mut std = [0.0; FEATURE_COUNT];
    for row in rows {
        for c in 0..FEATURE_COUNT {
            let d = row[c] - mean[c];
            std[c] += d * d;
        }
    }
    for s in std.iter_mut() {
        *s = (*s / n).sqrt().max(Scaler::MIN_STD);
    }

    Scaler { mean, std }
}

/// Transform all rows into a `(n_rows, FEATURE_COUNT)` matrix.
pub fn transform_all(rows: &[[f64; FEATURE_COUNT]], sc: &Scaler) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), FEATURE_COUNT), |(r, c)| {
        (rows[r][c] - sc.mean[c]) / sc.std[c]
    })
}
