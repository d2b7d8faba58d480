//! Random forest of bootstrapped, class-balanced trees.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ForestParams;
use crate::models::classifier_trait::ClassifierModel;
use crate::models::tree::{mean_importances, DecisionTree, FitData, TreeParams};
use crate::schema::FEATURE_COUNT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit `params.n_estimators` trees in parallel.
    ///
    /// Tree `k` draws its bootstrap sample and feature subsets from a generator
    /// seeded with `seed + k`, so the result does not depend on thread scheduling.
    pub fn fit(
        rows: &[[f64; FEATURE_COUNT]],
        labels: &[u8],
        params: &ForestParams,
        seed: u64,
    ) -> Self {
        let n = rows.len();
        let class_weight = class_weights(labels, params.class_balanced);
        let targets: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: params
                .max_features
                .unwrap_or_else(|| (FEATURE_COUNT as f64).sqrt().floor() as usize),
        };

        let trees: Vec<DecisionTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|k| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(k as u64));
                let mut counts = vec![0u32; n];
                for _ in 0..n {
                    counts[rng.gen_range(0..n)] += 1;
                }
                let weights: Vec<f64> = counts
                    .iter()
                    .zip(labels)
                    .map(|(&c, &l)| f64::from(c) * class_weight[l as usize])
                    .collect();
                let indices: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();
                let data = FitData {
                    rows,
                    targets: &targets,
                    hessians: None,
                    weights: &weights,
                };
                DecisionTree::fit(&data, indices, &tree_params, &mut rng)
            })
            .collect();

        log::debug!(
            "Random forest: {} trees, mean depth {:.1}, mean leaves {:.1}",
            trees.len(),
            trees.iter().map(|t| t.depth() as f64).sum::<f64>() / trees.len().max(1) as f64,
            trees.iter().map(|t| t.n_leaves() as f64).sum::<f64>() / trees.len().max(1) as f64
        );
        RandomForest { trees }
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Gain-based importance averaged over the trees.
    pub fn feature_importances(&self) -> [f64; FEATURE_COUNT] {
        mean_importances(&self.trees)
    }
}

/// `n / (2 * n_class)` per class when balancing, otherwise ones.
fn class_weights(labels: &[u8], balanced: bool) -> [f64; 2] {
    if !balanced {
        return [1.0, 1.0];
    }
    let n = labels.len() as f64;
    let n_pos = labels.iter().filter(|&&l| l == 1).count() as f64;
    let n_neg = n - n_pos;
    let weight = |n_c: f64| if n_c > 0.0 { n / (2.0 * n_c) } else { 1.0 };
    [weight(n_neg), weight(n_pos)]
}

impl ClassifierModel for RandomForest {
    fn predict_proba(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        (sum / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    fn name(&self) -> &str {
        "random_forest"
    }
}
