//! Feed-forward network with ReLU hidden layers and a sigmoid output, trained with
//! Adam on binary cross-entropy.
use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::MlpParams;
use crate::models::classifier_trait::ClassifierModel;
use crate::models::gbdt::sigmoid;
use crate::preprocessing::{fit_scaler, transform_all, Scaler};
use crate::schema::FEATURE_COUNT;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpClassifier {
    scaler: Scaler,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
}

struct AdamState {
    m_w: Vec<Array2<f64>>,
    v_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_b: Vec<Array1<f64>>,
    t: i32,
}

fn adam_step<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    step_size: f64,
) {
    Zip::from(param)
        .and(m)
        .and(v)
        .and(grad)
        .for_each(|p, m, v, &g| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= step_size * *m / (v.sqrt() + ADAM_EPS);
        });
}

impl MlpClassifier {
    pub fn fit(
        rows: &[[f64; FEATURE_COUNT]],
        labels: &[u8],
        params: &MlpParams,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let scaler = fit_scaler(rows);
        let x = transform_all(rows, &scaler);
        let y: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();

        let mut sizes = vec![FEATURE_COUNT];
        sizes.extend(params.hidden_layers.iter().copied().filter(|&h| h > 0));
        sizes.push(1);

        let mut weights = Vec::with_capacity(sizes.len() - 1);
        let mut biases = Vec::with_capacity(sizes.len() - 1);
        for pair in sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
            weights.push(Array2::from_shape_fn((fan_in, fan_out), |_| {
                rng.gen_range(-bound..bound)
            }));
            biases.push(Array1::from_shape_fn(fan_out, |_| rng.gen_range(-bound..bound)));
        }

        let mut model = MlpClassifier {
            scaler,
            weights,
            biases,
        };
        let mut adam = AdamState {
            m_w: model.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            v_w: model.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            m_b: model.biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect(),
            v_b: model.biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect(),
            t: 0,
        };

        let n = rows.len();
        let batch_size = params.batch_size.clamp(1, n.max(1));
        let mut order: Vec<usize> = (0..n).collect();
        for epoch in 0..params.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for batch in order.chunks(batch_size) {
                let xb = Array2::from_shape_fn((batch.len(), FEATURE_COUNT), |(r, c)| {
                    x[[batch[r], c]]
                });
                let yb = Array2::from_shape_fn((batch.len(), 1), |(r, _)| y[batch[r]]);
                epoch_loss += model.train_batch(&xb, &yb, params, &mut adam) * batch.len() as f64;
            }
            if (epoch + 1) % 50 == 0 {
                log::debug!(
                    "Neural network epoch {}: training loss {:.5}",
                    epoch + 1,
                    epoch_loss / n.max(1) as f64
                );
            }
        }
        model
    }

    /// Activations of every layer, input first, output (probabilities) last.
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = vec![x.clone()];
        let last = self.weights.len() - 1;
        for (l, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let mut z = activations[l].dot(w);
            z += b;
            let a = if l == last {
                z.mapv(sigmoid)
            } else {
                z.mapv(|v| v.max(0.0))
            };
            activations.push(a);
        }
        activations
    }

    /// One Adam step on a mini-batch; returns the batch loss.
    fn train_batch(
        &mut self,
        xb: &Array2<f64>,
        yb: &Array2<f64>,
        params: &MlpParams,
        adam: &mut AdamState,
    ) -> f64 {
        let b = xb.nrows() as f64;
        let activations = self.forward(xb);
        let out = &activations[activations.len() - 1];

        let eps = 1e-12;
        let cross_entropy: f64 = out
            .iter()
            .zip(yb.iter())
            .map(|(&p, &t)| {
                let p = p.clamp(eps, 1.0 - eps);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            })
            .sum();
        let penalty: f64 = self.weights.iter().map(|w| w.mapv(|v| v * v).sum()).sum();
        let loss = (cross_entropy + 0.5 * params.alpha * penalty) / b;

        adam.t += 1;
        let step_size = params.learning_rate * (1.0 - BETA2.powi(adam.t)).sqrt()
            / (1.0 - BETA1.powi(adam.t));

        // sigmoid + cross-entropy: dL/dz = p - y
        let mut delta = out - yb;
        for l in (0..self.weights.len()).rev() {
            let grad_w = (activations[l].t().dot(&delta) + &self.weights[l] * params.alpha) / b;
            let grad_b = delta.sum_axis(Axis(0)) / b;
            if l > 0 {
                let mut prev = delta.dot(&self.weights[l].t());
                Zip::from(&mut prev)
                    .and(&activations[l])
                    .for_each(|d, &a| {
                        if a <= 0.0 {
                            *d = 0.0;
                        }
                    });
                delta = prev;
            }
            adam_step(&mut self.weights[l], &grad_w, &mut adam.m_w[l], &mut adam.v_w[l], step_size);
            adam_step(&mut self.biases[l], &grad_b, &mut adam.m_b[l], &mut adam.v_b[l], step_size);
        }
        loss
    }
}

impl ClassifierModel for MlpClassifier {
    fn predict_proba(&self, x: &[f64]) -> f64 {
        let scaled = self.scaler.transform(x);
        let mut a = Array1::from(scaled.to_vec());
        let last = self.weights.len() - 1;
        for (l, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = a.dot(w) + b;
            a = if l == last {
                z.mapv(sigmoid)
            } else {
                z.mapv(|v| v.max(0.0))
            };
        }
        a.get(0).copied().unwrap_or(0.5).clamp(0.0, 1.0)
    }

    fn name(&self) -> &str {
        "neural_network"
    }
}
