use serde::{Deserialize, Serialize};

use crate::models::classifier_trait::ClassifierModel;
use crate::models::factory::TrainedModel;

/// Soft-voting combiner: weighted mean of member probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftVotingEnsemble {
    members: Vec<(TrainedModel, f64)>,
}

impl SoftVotingEnsemble {
    /// Members with non-positive weight are dropped. At least one member must keep
    /// a positive weight.
    pub fn new(members: Vec<(TrainedModel, f64)>) -> Option<Self> {
        let members: Vec<(TrainedModel, f64)> = members
            .into_iter()
            .filter(|(_, w)| *w > 0.0 && w.is_finite())
            .collect();
        if members.is_empty() {
            None
        } else {
            Some(SoftVotingEnsemble { members })
        }
    }

    pub fn members(&self) -> &[(TrainedModel, f64)] {
        &self.members
    }

    pub fn total_weight(&self) -> f64 {
        self.members.iter().map(|(_, w)| w).sum()
    }
}

impl ClassifierModel for SoftVotingEnsemble {
    fn predict_proba(&self, x: &[f64]) -> f64 {
        let total = self.total_weight();
        let weighted: f64 = self
            .members
            .iter()
            .map(|(m, w)| w * m.predict_proba(x))
            .sum();
        (weighted / total).clamp(0.0, 1.0)
    }

    fn name(&self) -> &str {
        "soft_voting"
    }
}
