//! Local surrogate explanations.
//!
//! Each feature is cut into quartile bins on the background sample. Perturbed
//! samples are drawn feature by feature from the background, encoded as "falls in
//! the same bin as the explained record", weighted by an exponential kernel on
//! that binary encoding and regressed (ridge, with intercept) on the model's
//! dropout probability. The coefficients are the attributions.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::statistics::{Data, OrderStatistics};

use crate::explain::{Attributor, ExplainError, FeatureAttribution};
use crate::models::{ClassifierModel, TrainedModel};
use crate::schema::{FeatureRecord, FEATURE_COUNT, FEATURE_NAMES};

pub const METHOD_NAME: &str = "lime";

const RIDGE_ALPHA: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct LimeAttributor {
    pub num_samples: usize,
    /// `None` means `0.75 * sqrt(n_features)`.
    pub kernel_width: Option<f64>,
    /// Unseeded attributors draw fresh samples on every call.
    pub seed: Option<u64>,
}

impl Default for LimeAttributor {
    fn default() -> Self {
        LimeAttributor {
            num_samples: 1000,
            kernel_width: None,
            seed: None,
        }
    }
}

/// Quartile cut points of one feature.
#[derive(Debug, Clone, PartialEq)]
struct Bins {
    edges: Vec<f64>,
}

impl Bins {
    fn fit(values: Vec<f64>) -> Self {
        let mut data = Data::new(values);
        let mut edges: Vec<f64> = [0.25, 0.5, 0.75]
            .iter()
            .map(|&tau| data.quantile(tau))
            .filter(|q| q.is_finite())
            .collect();
        edges.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
        Bins { edges }
    }

    /// Index of the bin holding `v`; bin `i` is `(edges[i-1], edges[i]]`.
    fn bin(&self, v: f64) -> usize {
        self.edges.iter().filter(|&&e| e < v).count()
    }

    fn condition(&self, name: &str, v: f64) -> String {
        let b = self.bin(v);
        if self.edges.is_empty() {
            return format!("{} = {:.2}", name, v);
        }
        if b == 0 {
            format!("{} <= {:.2}", name, self.edges[0])
        } else if b == self.edges.len() {
            format!("{} > {:.2}", name, self.edges[b - 1])
        } else {
            format!("{:.2} < {} <= {:.2}", self.edges[b - 1], name, self.edges[b])
        }
    }
}

impl LimeAttributor {
    pub fn new(num_samples: usize, kernel_width: Option<f64>, seed: Option<u64>) -> Self {
        LimeAttributor {
            num_samples,
            kernel_width,
            seed,
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl Attributor for LimeAttributor {
    fn name(&self) -> &str {
        METHOD_NAME
    }

    fn attribute(
        &self,
        record: &FeatureRecord,
        model: &TrainedModel,
        background: &[[f64; FEATURE_COUNT]],
    ) -> Result<Vec<FeatureAttribution>, ExplainError> {
        if background.is_empty() {
            return Err(ExplainError::MissingBackground);
        }
        let x = record.to_array();
        let bins: Vec<Bins> = (0..FEATURE_COUNT)
            .map(|f| Bins::fit(background.iter().map(|row| row[f]).collect()))
            .collect();
        let instance_bins: Vec<usize> = bins.iter().zip(x).map(|(b, v)| b.bin(v)).collect();

        let n = self.num_samples.max(2);
        let width = self
            .kernel_width
            .unwrap_or_else(|| 0.75 * (FEATURE_COUNT as f64).sqrt());
        let mut rng = self.rng();

        let mut z = Vec::with_capacity(n);
        let mut targets = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        for j in 0..n {
            let sample: [f64; FEATURE_COUNT] = if j == 0 {
                x
            } else {
                let mut s = [0.0; FEATURE_COUNT];
                for (f, slot) in s.iter_mut().enumerate() {
                    *slot = background[rng.gen_range(0..background.len())][f];
                }
                s
            };
            let mut encoded = [0.0; FEATURE_COUNT];
            for f in 0..FEATURE_COUNT {
                encoded[f] = f64::from(u8::from(bins[f].bin(sample[f]) == instance_bins[f]));
            }
            let dist_sq: f64 = encoded.iter().map(|e| 1.0 - e).sum();
            weights.push((-dist_sq / (width * width)).exp().sqrt());
            targets.push(model.predict_proba(&sample));
            z.push(encoded);
        }

        let coefficients = weighted_ridge(&z, &targets, &weights, RIDGE_ALPHA)?;
        Ok(FEATURE_NAMES
            .iter()
            .enumerate()
            .map(|(f, name)| FeatureAttribution {
                name: name.to_string(),
                attribution: coefficients[f],
                raw_value: x[f],
                condition: Some(bins[f].condition(name, x[f])),
            })
            .collect())
    }
}

/// Ridge regression with an unpenalised intercept; returns the slope coefficients.
fn weighted_ridge(
    x: &[[f64; FEATURE_COUNT]],
    y: &[f64],
    w: &[f64],
    alpha: f64,
) -> Result<[f64; FEATURE_COUNT], ExplainError> {
    let total_w: f64 = w.iter().sum();
    if !(total_w > 0.0) {
        return Err(ExplainError::Numerical("kernel weights sum to zero".to_string()));
    }

    let mut x_mean = [0.0; FEATURE_COUNT];
    let mut y_mean = 0.0;
    for ((row, &yi), &wi) in x.iter().zip(y).zip(w) {
        for f in 0..FEATURE_COUNT {
            x_mean[f] += wi * row[f];
        }
        y_mean += wi * yi;
    }
    for m in x_mean.iter_mut() {
        *m /= total_w;
    }
    y_mean /= total_w;

    // normal equations on centred data: (Xc' W Xc + alpha I) b = Xc' W yc
    let mut a = [[0.0; FEATURE_COUNT]; FEATURE_COUNT];
    let mut rhs = [0.0; FEATURE_COUNT];
    for ((row, &yi), &wi) in x.iter().zip(y).zip(w) {
        let mut xc = [0.0; FEATURE_COUNT];
        for f in 0..FEATURE_COUNT {
            xc[f] = row[f] - x_mean[f];
        }
        for r in 0..FEATURE_COUNT {
            rhs[r] += wi * xc[r] * (yi - y_mean);
            for c in 0..FEATURE_COUNT {
                a[r][c] += wi * xc[r] * xc[c];
            }
        }
    }
    for (d, row) in a.iter_mut().enumerate() {
        row[d] += alpha;
    }
    solve(a, rhs)
}

/// Gaussian elimination with partial pivoting.
fn solve(
    mut a: [[f64; FEATURE_COUNT]; FEATURE_COUNT],
    mut b: [f64; FEATURE_COUNT],
) -> Result<[f64; FEATURE_COUNT], ExplainError> {
    let n = FEATURE_COUNT;
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(ExplainError::Numerical("singular surrogate system".to_string()));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut out = [0.0; FEATURE_COUNT];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * out[k]).sum();
        out[row] = (b[row] - tail) / a[row][row];
    }
    if out.iter().any(|v| !v.is_finite()) {
        return Err(ExplainError::Numerical("non-finite surrogate coefficient".to_string()));
    }
    Ok(out)
}
