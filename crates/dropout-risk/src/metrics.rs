//! Binary classification metrics computed on the held-out partition.
use serde::{Deserialize, Serialize};

/// Metrics for one model variant on the test partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub auc: f64,
    /// Precision of the dropout class.
    pub precision: f64,
    /// Recall of the dropout class.
    pub recall: f64,
    /// `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: [[usize; 2]; 2],
    /// ROC curve as (false positive rate, true positive rate) points.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roc_curve: Vec<(f64, f64)>,
    /// k-fold accuracy on the training partition, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_validation: Option<CrossValidation>,
}

/// Accuracy of a variant refitted on k-1 folds and scored on the remaining one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub fold_accuracies: Vec<f64>,
    pub mean_accuracy: f64,
    /// Population standard deviation across folds.
    pub std_accuracy: f64,
}

impl CrossValidation {
    /// `None` when no fold was scored.
    pub fn from_folds(fold_accuracies: Vec<f64>) -> Option<Self> {
        if fold_accuracies.is_empty() {
            return None;
        }
        let n = fold_accuracies.len() as f64;
        let mean = fold_accuracies.iter().sum::<f64>() / n;
        let variance = fold_accuracies
            .iter()
            .map(|a| (a - mean).powi(2))
            .sum::<f64>()
            / n;
        Some(CrossValidation {
            fold_accuracies,
            mean_accuracy: mean,
            std_accuracy: variance.sqrt(),
        })
    }

    pub fn folds(&self) -> usize {
        self.fold_accuracies.len()
    }
}

/// Fraction of labels matched by `score >= 0.5`.
pub fn accuracy(scores: &[f64], labels: &[u8]) -> f64 {
    assert_eq!(scores.len(), labels.len(), "scores and labels must have equal lengths");
    if scores.is_empty() {
        return 0.0;
    }
    let correct = scores
        .iter()
        .zip(labels)
        .filter(|(&s, &l)| (s >= 0.5) == (l == 1))
        .count();
    correct as f64 / scores.len() as f64
}

pub fn confusion_matrix(scores: &[f64], labels: &[u8]) -> [[usize; 2]; 2] {
    assert_eq!(scores.len(), labels.len(), "scores and labels must have equal lengths");
    let mut cm = [[0usize; 2]; 2];
    for (&s, &l) in scores.iter().zip(labels) {
        let predicted = usize::from(s >= 0.5);
        cm[l as usize][predicted] += 1;
    }
    cm
}

/// Area under the ROC curve via the rank-sum (Mann-Whitney) statistic.
///
/// Tied scores receive their average rank. Returns `None` when only one class
/// is present, since the curve is undefined.
pub fn roc_auc(scores: &[f64], labels: &[u8]) -> Option<f64> {
    assert_eq!(scores.len(), labels.len(), "scores and labels must have equal lengths");
    let n_pos = labels.iter().filter(|&&l| l == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; ties share the mean of their positions
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, &l)| l == 1)
        .map(|(r, _)| r)
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// ROC curve points, one per distinct score threshold, from (0,0) to (1,1).
pub fn roc_curve(scores: &[f64], labels: &[u8]) -> Vec<(f64, f64)> {
    assert_eq!(scores.len(), labels.len(), "scores and labels must have equal lengths");
    let n_pos = labels.iter().filter(|&&l| l == 1).count() as f64;
    let n_neg = labels.len() as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = vec![(0.0, 0.0)];
    let (mut tp, mut fp) = (0.0, 0.0);
    for (k, &idx) in order.iter().enumerate() {
        if labels[idx] == 1 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_threshold = k + 1 == order.len() || scores[order[k + 1]] != scores[idx];
        if last_of_threshold {
            points.push((fp / n_neg, tp / n_pos));
        }
    }
    points
}

/// Compute every metric in one pass. `None` when the labels hold a single class.
pub fn evaluate_scores(scores: &[f64], labels: &[u8]) -> Option<Evaluation> {
    let auc = roc_auc(scores, labels)?;
    let cm = confusion_matrix(scores, labels);
    let tp = cm[1][1] as f64;
    let fp = cm[0][1] as f64;
    let fn_ = cm[1][0] as f64;
    let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
    let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };

    Some(Evaluation {
        accuracy: accuracy(scores, labels),
        auc,
        precision,
        recall,
        confusion_matrix: cm,
        roc_curve: roc_curve(scores, labels),
        cross_validation: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auc_of_perfect_ranking_is_one() {
        let scores = [0.1, 0.2, 0.8, 0.9];
        let labels = [0, 0, 1, 1];
        assert_eq!(roc_auc(&scores, &labels), Some(1.0));
    }

    #[test]
    fn auc_of_inverted_ranking_is_zero() {
        let scores = [0.9, 0.8, 0.2, 0.1];
        let labels = [0, 0, 1, 1];
        assert_eq!(roc_auc(&scores, &labels), Some(0.0));
    }

    #[test]
    fn auc_handles_ties() {
        let scores = [0.5, 0.5, 0.5, 0.5];
        let labels = [0, 1, 0, 1];
        assert_eq!(roc_auc(&scores, &labels), Some(0.5));

        // sklearn: roc_auc_score([0,0,1,1],[0.1,0.4,0.35,0.8]) == 0.75
        let scores = [0.1, 0.4, 0.35, 0.8];
        let labels = [0, 0, 1, 1];
        let auc = roc_auc(&scores, &labels).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn auc_is_undefined_for_single_class() {
        assert_eq!(roc_auc(&[0.1, 0.9], &[1, 1]), None);
        assert!(evaluate_scores(&[0.1, 0.9], &[0, 0]).is_none());
    }

    #[test]
    fn confusion_and_derived_metrics() {
        let scores = [0.9, 0.7, 0.4, 0.2, 0.6];
        let labels = [1, 0, 1, 0, 1];
        let eval = evaluate_scores(&scores, &labels).unwrap();
        assert_eq!(eval.confusion_matrix, [[1, 1], [1, 2]]);
        assert!((eval.accuracy - 0.6).abs() < 1e-12);
        assert!((eval.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((eval.recall - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn roc_curve_spans_unit_square() {
        let scores = [0.1, 0.4, 0.35, 0.8];
        let labels = [0, 0, 1, 1];
        let curve = roc_curve(&scores, &labels);
        assert_eq!(curve.first(), Some(&(0.0, 0.0)));
        assert_eq!(curve.last(), Some(&(1.0, 1.0)));
        assert!(curve.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1));
    }

    #[test]
    fn cross_validation_summarises_folds() {
        let cv = CrossValidation::from_folds(vec![0.8, 0.9, 0.7]).unwrap();
        assert_eq!(cv.folds(), 3);
        assert!((cv.mean_accuracy - 0.8).abs() < 1e-12);
        assert!((cv.std_accuracy - (0.02f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!(CrossValidation::from_folds(Vec::new()).is_none());

        let eval = evaluate_scores(&[0.2, 0.8], &[0, 1]).unwrap();
        let json = serde_json::to_string(&eval).unwrap();
        assert!(!json.contains("cross_validation"));
    }
}
