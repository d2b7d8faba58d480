//! Exact path-dependent TreeSHAP.
//!
//! For a single tree the recursion tracks, along the current root-to-leaf path,
//! the fraction of "feature absent" flow (by node cover) and "feature present"
//! flow (following the instance), and the Shapley weights of every subset size.
//! Values add up with the expected value of the tree to its prediction.
use crate::explain::{Attributor, ExplainError, FeatureAttribution};
use crate::models::forest::RandomForest;
use crate::models::gbdt::{sigmoid, GradientBoosting};
use crate::models::tree::{DecisionTree, Node};
use crate::models::voting::SoftVotingEnsemble;
use crate::models::{ClassifierModel, TrainedModel};
use crate::schema::{FeatureRecord, FEATURE_COUNT, FEATURE_NAMES};

pub const METHOD_NAME: &str = "tree_shap";

/// Attribution of one model output: `base + sum(values) == output`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapValues {
    pub base: f64,
    pub values: [f64; FEATURE_COUNT],
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Cover-weighted mean leaf value.
pub fn expected_value(tree: &DecisionTree) -> f64 {
    let nodes = tree.nodes();
    let root_cover = nodes.first().map_or(0.0, Node::cover);
    if root_cover <= 0.0 {
        return 0.0;
    }
    nodes
        .iter()
        .map(|n| match n {
            Node::Leaf { value, cover } => value * cover / root_cover,
            Node::Split { .. } => 0.0,
        })
        .sum()
}

/// SHAP values of one tree's raw output at `x`.
pub fn tree_shap(tree: &DecisionTree, x: &[f64]) -> ShapValues {
    let mut values = [0.0; FEATURE_COUNT];
    if !tree.nodes().is_empty() {
        recurse(tree.nodes(), x, &mut values, 0, &[], 0, 1.0, 1.0, None);
    }
    ShapValues {
        base: expected_value(tree),
        values,
    }
}

fn extend_path(
    path: &mut Vec<PathElement>,
    unique_depth: usize,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    path.truncate(unique_depth);
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if unique_depth == 0 { 1.0 } else { 0.0 },
    });
    let denom = (unique_depth + 1) as f64;
    for i in (0..unique_depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / denom;
        path[i].pweight = zero_fraction * path[i].pweight * (unique_depth - i) as f64 / denom;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, unique_depth: usize, path_index: usize) {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let denom = (unique_depth + 1) as f64;
    let mut next_one_portion = path[unique_depth].pweight;

    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            next_one_portion =
                tmp - path[i].pweight * zero_fraction * (unique_depth - i) as f64 / denom;
        } else {
            path[i].pweight = path[i].pweight * denom / (zero_fraction * (unique_depth - i) as f64);
        }
    }
    for i in path_index..unique_depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.truncate(unique_depth);
}

/// Total permutation weight of the path with element `path_index` removed.
fn unwound_path_sum(path: &[PathElement], unique_depth: usize, path_index: usize) -> f64 {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let denom = (unique_depth + 1) as f64;
    let mut next_one_portion = path[unique_depth].pweight;
    let mut total = 0.0;

    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * (unique_depth - i) as f64 / denom;
        } else if zero_fraction != 0.0 {
            total += path[i].pweight / zero_fraction / ((unique_depth - i) as f64 / denom);
        }
    }
    total
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    nodes: &[Node],
    x: &[f64],
    phi: &mut [f64; FEATURE_COUNT],
    node: usize,
    parent_path: &[PathElement],
    unique_depth: usize,
    parent_zero_fraction: f64,
    parent_one_fraction: f64,
    parent_feature: Option<usize>,
) {
    let mut path = parent_path.to_vec();
    extend_path(
        &mut path,
        unique_depth,
        parent_zero_fraction,
        parent_one_fraction,
        parent_feature,
    );
    let mut unique_depth = unique_depth;

    match &nodes[node] {
        Node::Leaf { value, .. } => {
            for i in 1..=unique_depth {
                let weight = unwound_path_sum(&path, unique_depth, i);
                let el = path[i];
                if let Some(f) = el.feature {
                    phi[f] += weight * (el.one_fraction - el.zero_fraction) * value;
                }
            }
        }
        Node::Split {
            feature,
            threshold,
            left,
            right,
            cover,
            ..
        } => {
            let (hot, cold) = if x[*feature] <= *threshold {
                (*left, *right)
            } else {
                (*right, *left)
            };
            let hot_zero_fraction = nodes[hot].cover() / cover;
            let cold_zero_fraction = nodes[cold].cover() / cover;
            let mut incoming_zero_fraction = 1.0;
            let mut incoming_one_fraction = 1.0;

            // a feature seen earlier on the path is merged into one element
            if let Some(k) = (1..=unique_depth).find(|&k| path[k].feature == Some(*feature)) {
                incoming_zero_fraction = path[k].zero_fraction;
                incoming_one_fraction = path[k].one_fraction;
                unwind_path(&mut path, unique_depth, k);
                unique_depth -= 1;
            }

            recurse(
                nodes,
                x,
                phi,
                hot,
                &path,
                unique_depth + 1,
                hot_zero_fraction * incoming_zero_fraction,
                incoming_one_fraction,
                Some(*feature),
            );
            recurse(
                nodes,
                x,
                phi,
                cold,
                &path,
                unique_depth + 1,
                cold_zero_fraction * incoming_zero_fraction,
                0.0,
                Some(*feature),
            );
        }
    }
}

fn forest_shap(forest: &RandomForest, x: &[f64]) -> ShapValues {
    let trees = forest.trees();
    let mut out = ShapValues {
        base: 0.0,
        values: [0.0; FEATURE_COUNT],
    };
    if trees.is_empty() {
        out.base = 0.5;
        return out;
    }
    let scale = 1.0 / trees.len() as f64;
    for tree in trees {
        let sv = tree_shap(tree, x);
        out.base += scale * sv.base;
        for (acc, v) in out.values.iter_mut().zip(sv.values) {
            *acc += scale * v;
        }
    }
    out
}

/// Boosting attributions in log-odds space, then rescaled to probabilities.
fn boosting_shap(model: &GradientBoosting, x: &[f64]) -> ShapValues {
    let lr = model.learning_rate();
    let mut margin_base = model.init();
    let mut margin_values = [0.0; FEATURE_COUNT];
    for tree in model.trees() {
        let sv = tree_shap(tree, x);
        margin_base += lr * sv.base;
        for (acc, v) in margin_values.iter_mut().zip(sv.values) {
            *acc += lr * v;
        }
    }

    let margin = model.decision_function(x);
    let p = sigmoid(margin);
    let p_base = sigmoid(margin_base);
    let delta = margin - margin_base;
    let factor = if delta.abs() > 1e-12 {
        (p - p_base) / delta
    } else {
        p * (1.0 - p)
    };

    let mut values = [0.0; FEATURE_COUNT];
    for (out, v) in values.iter_mut().zip(margin_values) {
        *out = factor * v;
    }
    ShapValues {
        base: p_base,
        values,
    }
}

fn voting_shap(ensemble: &SoftVotingEnsemble, x: &[f64]) -> Result<ShapValues, ExplainError> {
    let total = ensemble.total_weight();
    let mut out = ShapValues {
        base: 0.0,
        values: [0.0; FEATURE_COUNT],
    };
    for (member, weight) in ensemble.members() {
        let sv = shap_values(member, x)?;
        let w = weight / total;
        out.base += w * sv.base;
        for (acc, v) in out.values.iter_mut().zip(sv.values) {
            *acc += w * v;
        }
    }
    Ok(out)
}

/// SHAP values of the model's dropout probability at `x`.
pub fn shap_values(model: &TrainedModel, x: &[f64]) -> Result<ShapValues, ExplainError> {
    match model {
        TrainedModel::BaggedTrees(forest) => Ok(forest_shap(forest, x)),
        TrainedModel::BoostedTrees(boosting) => Ok(boosting_shap(boosting, x)),
        TrainedModel::SoftVoting(ensemble) => voting_shap(ensemble, x),
        TrainedModel::NeuralNetwork(m) => Err(ExplainError::UnsupportedModel(m.name().to_string())),
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreeShapAttributor;

impl Attributor for TreeShapAttributor {
    fn name(&self) -> &str {
        METHOD_NAME
    }

    fn attribute(
        &self,
        record: &FeatureRecord,
        model: &TrainedModel,
        _background: &[[f64; FEATURE_COUNT]],
    ) -> Result<Vec<FeatureAttribution>, ExplainError> {
        let x = record.to_array();
        let sv = shap_values(model, &x)?;
        if sv.values.iter().any(|v| !v.is_finite()) {
            return Err(ExplainError::Numerical(
                "non-finite SHAP value".to_string(),
            ));
        }
        Ok(FEATURE_NAMES
            .iter()
            .zip(sv.values)
            .zip(x)
            .map(|((name, attribution), raw_value)| FeatureAttribution {
                name: name.to_string(),
                attribution,
                raw_value,
                condition: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tree::{FitData, TreeParams};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fit_tree(rows: &[[f64; FEATURE_COUNT]], targets: &[f64]) -> DecisionTree {
        let weights = vec![1.0; rows.len()];
        let data = FitData {
            rows,
            targets,
            hessians: None,
            weights: &weights,
        };
        let params = TreeParams {
            max_depth: 6,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: FEATURE_COUNT,
        };
        let mut rng = StdRng::seed_from_u64(5);
        DecisionTree::fit(&data, (0..rows.len()).collect(), &params, &mut rng)
    }

    /// Brute-force Shapley values with the same cover-based conditional expectation.
    fn brute_force(tree: &DecisionTree, x: &[f64]) -> [f64; FEATURE_COUNT] {
        fn cond_exp(nodes: &[Node], idx: usize, x: &[f64], present: u32) -> f64 {
            match &nodes[idx] {
                Node::Leaf { value, .. } => *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    cover,
                    ..
                } => {
                    if present & (1 << feature) != 0 {
                        let next = if x[*feature] <= *threshold { *left } else { *right };
                        cond_exp(nodes, next, x, present)
                    } else {
                        (nodes[*left].cover() * cond_exp(nodes, *left, x, present)
                            + nodes[*right].cover() * cond_exp(nodes, *right, x, present))
                            / cover
                    }
                }
            }
        }
        let fact = |n: usize| -> f64 { (1..=n).map(|v| v as f64).product() };
        let m = FEATURE_COUNT;
        let mut phi = [0.0; FEATURE_COUNT];
        for (i, slot) in phi.iter_mut().enumerate() {
            for subset in 0u32..(1 << m) {
                if subset & (1 << i) != 0 {
                    continue;
                }
                let s = subset.count_ones() as usize;
                let weight = fact(s) * fact(m - s - 1) / fact(m);
                let with = cond_exp(tree.nodes(), 0, x, subset | (1 << i));
                let without = cond_exp(tree.nodes(), 0, x, subset);
                *slot += weight * (with - without);
            }
        }
        phi
    }

    fn sample_rows() -> (Vec<[f64; FEATURE_COUNT]>, Vec<f64>) {
        let rows: Vec<[f64; FEATURE_COUNT]> = (0..64)
            .map(|i| {
                let mut r = [0.0; FEATURE_COUNT];
                r[0] = (i % 4) as f64;
                r[3] = ((i / 4) % 2) as f64;
                r[5] = ((i * 5) % 13) as f64;
                r[1] = (i % 4 + (i / 8) % 3) as f64;
                r
            })
            .collect();
        let targets = rows
            .iter()
            .map(|r| f64::from(u8::from((r[3] == 1.0 && r[5] < 8.0) || r[0] + r[1] > 5.0)))
            .collect();
        (rows, targets)
    }

    #[test]
    fn matches_brute_force_shapley_values() {
        let (rows, targets) = sample_rows();
        let tree = fit_tree(&rows, &targets);
        assert!(tree.depth() >= 2);
        for x in rows.iter().step_by(7) {
            let fast = tree_shap(&tree, x);
            let slow = brute_force(&tree, x);
            for f in 0..FEATURE_COUNT {
                assert!(
                    (fast.values[f] - slow[f]).abs() < 1e-9,
                    "feature {}: {} vs {}",
                    f,
                    fast.values[f],
                    slow[f]
                );
            }
        }
    }

    #[test]
    fn values_add_up_to_prediction() {
        let (rows, targets) = sample_rows();
        let tree = fit_tree(&rows, &targets);
        for x in &rows {
            let sv = tree_shap(&tree, x);
            let total = sv.base + sv.values.iter().sum::<f64>();
            assert!((total - tree.predict(x)).abs() < 1e-9);
        }
    }

    #[test]
    fn unused_features_get_zero() {
        let (rows, targets) = sample_rows();
        let tree = fit_tree(&rows, &targets);
        let sv = tree_shap(&tree, &rows[3]);
        for f in [2usize, 4, 6, 7] {
            assert_eq!(sv.values[f], 0.0);
        }
    }
}
