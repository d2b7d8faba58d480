use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, VariantKind};
use crate::data_handling::TrainingDataset;
use crate::error::{Result, RiskError};
use crate::models::classifier_trait::ClassifierModel;
use crate::models::forest::RandomForest;
use crate::models::gbdt::GradientBoosting;
use crate::models::mlp::MlpClassifier;
use crate::models::voting::SoftVotingEnsemble;
use crate::schema::FEATURE_COUNT;

/// Every fitted model the pipeline can produce. Closed so persisted artifacts can
/// be decoded without a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum TrainedModel {
    BaggedTrees(RandomForest),
    BoostedTrees(GradientBoosting),
    NeuralNetwork(MlpClassifier),
    SoftVoting(SoftVotingEnsemble),
}

impl TrainedModel {
    fn inner(&self) -> &dyn ClassifierModel {
        match self {
            TrainedModel::BaggedTrees(m) => m,
            TrainedModel::BoostedTrees(m) => m,
            TrainedModel::NeuralNetwork(m) => m,
            TrainedModel::SoftVoting(m) => m,
        }
    }

    /// Display label used in reports.
    pub fn label(&self) -> String {
        match self {
            TrainedModel::BaggedTrees(_) => VariantKind::BaggedTrees.to_string(),
            TrainedModel::BoostedTrees(_) => VariantKind::BoostedTrees.to_string(),
            TrainedModel::NeuralNetwork(_) => VariantKind::NeuralNetwork.to_string(),
            TrainedModel::SoftVoting(_) => "Ensemble".to_string(),
        }
    }

    /// Global gain-based importance, summing to one. `None` for models without
    /// split structure; a soft-voting ensemble weights the members that have one.
    pub fn feature_importances(&self) -> Option<[f64; FEATURE_COUNT]> {
        match self {
            TrainedModel::BaggedTrees(m) => Some(m.feature_importances()),
            TrainedModel::BoostedTrees(m) => Some(m.feature_importances()),
            TrainedModel::NeuralNetwork(_) => None,
            TrainedModel::SoftVoting(ensemble) => {
                let mut total = [0.0; FEATURE_COUNT];
                let mut weight = 0.0;
                for (member, w) in ensemble.members() {
                    if let Some(importances) = member.feature_importances() {
                        for (slot, value) in total.iter_mut().zip(importances) {
                            *slot += w * value;
                        }
                        weight += w;
                    }
                }
                if weight <= 0.0 {
                    return None;
                }
                total.iter_mut().for_each(|v| *v /= weight);
                Some(total)
            }
        }
    }
}

impl ClassifierModel for TrainedModel {
    fn predict_proba(&self, x: &[f64]) -> f64 {
        self.inner().predict_proba(x)
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}

/// Fit one model variant on the training partition.
pub fn train_variant(
    train: &TrainingDataset,
    kind: VariantKind,
    config: &ModelConfig,
) -> Result<TrainedModel> {
    if train.is_empty() {
        return Err(RiskError::DataUnavailable(
            "training partition is empty".to_string(),
        ));
    }
    let rows = train.features();
    let labels = &train.labels;
    log::info!("Training {} on {} records", kind, rows.len());

    let model = match kind {
        VariantKind::BaggedTrees => TrainedModel::BaggedTrees(RandomForest::fit(
            &rows,
            labels,
            &config.forest,
            config.seed,
        )),
        VariantKind::BoostedTrees => TrainedModel::BoostedTrees(GradientBoosting::fit(
            &rows,
            labels,
            &config.boosting,
            config.seed,
        )),
        VariantKind::NeuralNetwork => TrainedModel::NeuralNetwork(MlpClassifier::fit(
            &rows,
            labels,
            &config.neural,
            config.seed,
        )),
    };
    Ok(model)
}

/// Combine already fitted bagged and boosted models into a soft-voting ensemble.
pub fn combine_ensemble(
    forest: TrainedModel,
    boosting: TrainedModel,
    config: &ModelConfig,
) -> Result<TrainedModel> {
    let (w_forest, w_boost) = config.ensemble_weights;
    SoftVotingEnsemble::new(vec![(forest, w_forest), (boosting, w_boost)])
        .map(TrainedModel::SoftVoting)
        .ok_or_else(|| {
            RiskError::InvalidConfig(format!(
                "ensemble weights ({}, {}) leave no member with positive weight",
                w_forest, w_boost
            ))
        })
}

/// Train bagged and boosted models and wrap them in a soft-voting combiner.
pub fn train_ensemble(train: &TrainingDataset, config: &ModelConfig) -> Result<TrainedModel> {
    let forest = train_variant(train, VariantKind::BaggedTrees, config)?;
    let boosting = train_variant(train, VariantKind::BoostedTrees, config)?;
    combine_ensemble(forest, boosting, config)
}
