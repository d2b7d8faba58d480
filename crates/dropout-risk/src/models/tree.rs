//! Binary regression tree shared by the forest and the boosting model.
//!
//! Splits minimise the weighted squared error of the targets, which for 0/1
//! targets ranks candidate splits exactly like Gini impurity. Leaves hold
//! `sum(w * target) / sum(w * hessian)`: with unit hessians that is the weighted
//! class frequency, with `p(1 - p)` hessians it is the Newton step used by log-loss
//! boosting. Every node records its weighted cover so path-dependent attribution
//! can be computed from the fitted structure alone.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::schema::FEATURE_COUNT;

const MIN_GAIN: f64 = 1e-12;
const MIN_DENOMINATOR: f64 = 1e-150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        cover: f64,
        /// Weighted squared-error reduction achieved by this split.
        #[serde(default)]
        gain: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl Node {
    pub fn cover(&self) -> f64 {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per node before settling for the best split found.
    pub max_features: usize,
}

/// Training inputs for one tree. Rows outside `indices` passed to
/// [`DecisionTree::fit`] are ignored.
pub struct FitData<'a> {
    pub rows: &'a [[f64; FEATURE_COUNT]],
    pub targets: &'a [f64],
    /// Per-row second-order weights; `None` means all ones.
    pub hessians: Option<&'a [f64]>,
    pub weights: &'a [f64],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Root is `nodes[0]`.
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl DecisionTree {
    /// Grow a tree on the rows named by `indices` (each at most once; repetition is
    /// expressed through `weights`).
    pub fn fit(data: &FitData, indices: Vec<usize>, params: &TreeParams, rng: &mut StdRng) -> Self {
        let mut tree = DecisionTree { nodes: Vec::new() };
        tree.grow(data, indices, params, rng, 0);
        tree
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Total split gain per feature, normalised to sum to one. All zeros for a
    /// single-leaf tree.
    pub fn feature_importances(&self) -> [f64; FEATURE_COUNT] {
        let mut importances = [0.0; FEATURE_COUNT];
        for node in &self.nodes {
            if let Node::Split { feature, gain, .. } = node {
                importances[*feature] += gain.max(0.0);
            }
        }
        normalize(&mut importances);
        importances
    }

    fn grow(
        &mut self,
        data: &FitData,
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
        depth: usize,
    ) -> usize {
        let id = self.nodes.len();
        let cover: f64 = indices.iter().map(|&i| data.weights[i]).sum();
        let value = leaf_value(data, &indices);
        self.nodes.push(Node::Leaf { value, cover });

        let n = indices.len();
        if depth >= params.max_depth
            || n < params.min_samples_split
            || n < 2 * params.min_samples_leaf.max(1)
            || is_pure(data.targets, &indices)
        {
            return id;
        }

        let best = match best_split(data, &indices, params, rng) {
            Some(best) => best,
            None => return id,
        };
        log::trace!(
            "node {} depth {}: split on feature {} at {:.4} (gain {:.6})",
            id,
            depth,
            best.feature,
            best.threshold,
            best.gain
        );

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| data.rows[i][best.feature] <= best.threshold);

        let left = self.grow(data, left_idx, params, rng, depth + 1);
        let right = self.grow(data, right_idx, params, rng, depth + 1);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
            cover,
            gain: best.gain,
        };
        id
    }
}

/// Mean of the per-tree importances, renormalised.
pub fn mean_importances(trees: &[DecisionTree]) -> [f64; FEATURE_COUNT] {
    let mut total = [0.0; FEATURE_COUNT];
    for tree in trees {
        for (slot, value) in total.iter_mut().zip(tree.feature_importances()) {
            *slot += value;
        }
    }
    normalize(&mut total);
    total
}

fn normalize(values: &mut [f64; FEATURE_COUNT]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}

fn leaf_value(data: &FitData, indices: &[usize]) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for &i in indices {
        let w = data.weights[i];
        num += w * data.targets[i];
        den += w * data.hessians.map_or(1.0, |h| h[i]);
    }
    if den.abs() < MIN_DENOMINATOR {
        0.0
    } else {
        num / den
    }
}

fn is_pure(targets: &[f64], indices: &[usize]) -> bool {
    let mut iter = indices.iter().map(|&i| targets[i]);
    match iter.next() {
        Some(first) => iter.all(|t| (t - first).abs() < 1e-12),
        None => true,
    }
}

fn best_split(
    data: &FitData,
    indices: &[usize],
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<BestSplit> {
    let mut features: Vec<usize> = (0..FEATURE_COUNT).collect();
    features.shuffle(rng);
    let max_features = params.max_features.clamp(1, FEATURE_COUNT);
    let min_leaf = params.min_samples_leaf.max(1);

    let total_w: f64 = indices.iter().map(|&i| data.weights[i]).sum();
    let total_s: f64 = indices
        .iter()
        .map(|&i| data.weights[i] * data.targets[i])
        .sum();
    if total_w <= 0.0 {
        return None;
    }
    let parent_score = total_s * total_s / total_w;

    let mut best: Option<BestSplit> = None;
    let mut order: Vec<usize> = indices.to_vec();

    for (visited, &feature) in features.iter().enumerate() {
        // keep looking past max_features until some valid split turns up
        if visited >= max_features && best.is_some() {
            break;
        }

        order.sort_by(|&a, &b| data.rows[a][feature].total_cmp(&data.rows[b][feature]));

        let mut left_w = 0.0;
        let mut left_s = 0.0;
        for pos in 0..order.len() - 1 {
            let i = order[pos];
            left_w += data.weights[i];
            left_s += data.weights[i] * data.targets[i];

            let n_left = pos + 1;
            if n_left < min_leaf || order.len() - n_left < min_leaf {
                continue;
            }
            let here = data.rows[i][feature];
            let next = data.rows[order[pos + 1]][feature];
            if here >= next {
                continue;
            }
            let right_w = total_w - left_w;
            if left_w <= 0.0 || right_w <= 0.0 {
                continue;
            }
            let right_s = total_s - left_s;
            let gain = left_s * left_s / left_w + right_s * right_s / right_w - parent_score;
            if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    gain,
                });
            }
        }
    }
    best
}
