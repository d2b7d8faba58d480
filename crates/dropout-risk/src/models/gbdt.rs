use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::BoostingParams;
use crate::models::classifier_trait::ClassifierModel;
use crate::models::tree::{mean_importances, DecisionTree, FitData, TreeParams};
use crate::schema::FEATURE_COUNT;

/// Gradient Boosting Decision Tree (GBDT) classifier with log loss.
///
/// The raw margin is `init + learning_rate * sum(tree(x))` in log-odds space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    trees: Vec<DecisionTree>,
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl GradientBoosting {
    pub fn fit(
        rows: &[[f64; FEATURE_COUNT]],
        labels: &[u8],
        params: &BoostingParams,
        seed: u64,
    ) -> Self {
        let n = rows.len();
        let y: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();
        let prior = (y.iter().sum::<f64>() / n.max(1) as f64).clamp(1e-6, 1.0 - 1e-6);
        let init = (prior / (1.0 - prior)).ln();

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: FEATURE_COUNT,
        };
        let weights = vec![1.0; n];
        let n_sub = ((n as f64 * params.subsample).round() as usize).clamp(1.min(n), n);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut margin = vec![init; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        for stage in 0..params.n_estimators {
            let prob: Vec<f64> = margin.iter().map(|&f| sigmoid(f)).collect();
            let residual: Vec<f64> = y.iter().zip(&prob).map(|(t, p)| t - p).collect();
            let hessian: Vec<f64> = prob.iter().map(|p| p * (1.0 - p)).collect();

            let indices: Vec<usize> = if n_sub < n {
                let mut idx = sample(&mut rng, n, n_sub).into_vec();
                idx.sort_unstable();
                idx
            } else {
                (0..n).collect()
            };

            let data = FitData {
                rows,
                targets: &residual,
                hessians: Some(&hessian),
                weights: &weights,
            };
            let tree = DecisionTree::fit(&data, indices, &tree_params, &mut rng);
            for (f, row) in margin.iter_mut().zip(rows) {
                *f += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);

            if log::log_enabled!(log::Level::Debug) && (stage + 1) % 25 == 0 {
                let loss = log_loss(&y, &margin);
                log::debug!("Boosting stage {}: training log loss {:.5}", stage + 1, loss);
            }
        }

        GradientBoosting {
            init,
            learning_rate: params.learning_rate,
            trees,
        }
    }

    /// Log-odds of the dropout class.
    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.init
            + self.learning_rate * self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    /// Margin before any tree is applied.
    pub fn init(&self) -> f64 {
        self.init
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Gain-based importance averaged over the trees.
    pub fn feature_importances(&self) -> [f64; FEATURE_COUNT] {
        mean_importances(&self.trees)
    }
}

fn log_loss(y: &[f64], margin: &[f64]) -> f64 {
    let eps = 1e-15;
    let total: f64 = y
        .iter()
        .zip(margin)
        .map(|(t, &f)| {
            let p = sigmoid(f).clamp(eps, 1.0 - eps);
            -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
        })
        .sum();
    total / y.len().max(1) as f64
}

impl ClassifierModel for GradientBoosting {
    fn predict_proba(&self, x: &[f64]) -> f64 {
        sigmoid(self.decision_function(x))
    }

    fn name(&self) -> &str {
        "gradient_boosting"
    }
}
