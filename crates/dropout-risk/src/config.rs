//! Pipeline configuration.
//!
//! Risk thresholds: a score below `medium` (0.3) is low risk, a score in
//! `[medium, high)` is medium risk and anything at or above `high` (0.6) is high
//! risk. Older dashboards used 0.4 / 0.7; the values here are the single
//! source of truth and can be changed without retraining.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};

/// Trainable model families.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    BaggedTrees,
    BoostedTrees,
    NeuralNetwork,
}

impl VariantKind {
    pub const ALL: [VariantKind; 3] = [
        VariantKind::BaggedTrees,
        VariantKind::BoostedTrees,
        VariantKind::NeuralNetwork,
    ];

    /// File stem of the variant's own artifact, written next to the deployed one.
    pub fn key(&self) -> &'static str {
        match self {
            VariantKind::BaggedTrees => "bagged_trees",
            VariantKind::BoostedTrees => "boosted_trees",
            VariantKind::NeuralNetwork => "neural_network",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VariantKind::BaggedTrees => "Random Forest",
            VariantKind::BoostedTrees => "Gradient Boosting",
            VariantKind::NeuralNetwork => "Neural Network",
        };
        f.write_str(label)
    }
}

impl FromStr for VariantKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "bagged_trees" | "random_forest" | "rf" => Ok(VariantKind::BaggedTrees),
            "boosted_trees" | "gradient_boosting" | "gbdt" => Ok(VariantKind::BoostedTrees),
            "neural_network" | "mlp" => Ok(VariantKind::NeuralNetwork),
            _ => Err(format!(
                "Unknown model variant: {}. Expected one of bagged-trees, boosted-trees, neural-network",
                s
            )),
        }
    }
}

/// Random forest hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` means `sqrt(n_features)`.
    pub max_features: Option<usize>,
    /// Weight classes by `n / (2 * n_class)` to counter label imbalance.
    pub class_balanced: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 15,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            class_balanced: true,
        }
    }
}

/// Gradient boosting hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Row fraction drawn (without replacement) per stage.
    pub subsample: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 5,
            min_samples_leaf: 2,
            subsample: 1.0,
        }
    }
}

/// Multi-layer perceptron hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MlpParams {
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// L2 penalty on weights.
    pub alpha: f64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 32],
            learning_rate: 1e-3,
            epochs: 200,
            batch_size: 64,
            alpha: 1e-4,
        }
    }
}

/// Central configuration for the trainable models.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub seed: u64,
    pub forest: ForestParams,
    pub boosting: BoostingParams,
    pub neural: MlpParams,
    /// Soft-voting weights for (bagged trees, boosted trees).
    pub ensemble_weights: (f64, f64),
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            forest: ForestParams::default(),
            boosting: BoostingParams::default(),
            neural: MlpParams::default(),
            ensemble_weights: (1.0, 1.0),
        }
    }
}

/// Lower bounds of the medium and high risk bands.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 0.3,
            high: 0.6,
        }
    }
}

impl RiskThresholds {
    pub fn new(medium: f64, high: f64) -> Result<Self> {
        let thresholds = Self { medium, high };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0 <= self.medium && self.medium < self.high && self.high <= 1.0) {
            return Err(RiskError::InvalidConfig(format!(
                "risk thresholds must satisfy 0 <= medium < high <= 1 (got {} / {})",
                self.medium, self.high
            )));
        }
        Ok(())
    }
}

/// Explanation settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExplainConfig {
    /// Features kept per explanation method.
    pub top_n: usize,
    /// Perturbations drawn by the local surrogate.
    pub lime_samples: usize,
    /// Fixes the local surrogate's sampling; unseeded runs vary slightly.
    pub lime_seed: Option<u64>,
    /// Kernel width; `None` means `0.75 * sqrt(n_features)`.
    pub kernel_width: Option<f64>,
    /// Training rows stored in the artifact as the background sample.
    pub background_size: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            lime_samples: 1000,
            lime_seed: None,
            kernel_width: None,
            background_size: 200,
        }
    }
}

/// Everything a training run or a serving process needs.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset_path: PathBuf,
    pub delimiter: char,
    /// Raw status column name, after header normalization.
    pub label_column: String,
    /// Deployed model artifact.
    pub model_path: PathBuf,
    /// JSON map of variant name to evaluation metrics.
    pub comparison_path: PathBuf,
    /// Optional HTML training report.
    pub html_report_path: Option<PathBuf>,
    pub test_fraction: f64,
    pub split_seed: u64,
    /// Stratified folds for cross-validated accuracy on the training partition.
    /// 0 disables cross-validation.
    pub cv_folds: usize,
    /// Also write one artifact per variant (and the ensemble) next to `model_path`.
    pub save_variant_artifacts: bool,
    pub model: ModelConfig,
    pub thresholds: RiskThresholds,
    pub explain: ExplainConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("dataset.csv"),
            delimiter: ',',
            label_column: crate::schema::TARGET_COLUMN.to_string(),
            model_path: PathBuf::from("models/model.json"),
            comparison_path: PathBuf::from("models/model_comparison.json"),
            html_report_path: Some(PathBuf::from("models/training_report.html")),
            test_fraction: 0.2,
            split_seed: 42,
            cv_folds: 3,
            save_variant_artifacts: true,
            model: ModelConfig::default(),
            thresholds: RiskThresholds::default(),
            explain: ExplainConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            RiskError::InvalidConfig(format!(
                "failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: PipelineConfig = serde_json::from_str(&content).map_err(|e| {
            RiskError::InvalidConfig(format!(
                "failed to parse config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(RiskError::InvalidConfig(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.cv_folds == 1 {
            return Err(RiskError::InvalidConfig(
                "cv_folds must be 0 (disabled) or at least 2".to_string(),
            ));
        }
        if !self.delimiter.is_ascii() {
            return Err(RiskError::InvalidConfig(format!(
                "delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            )));
        }
        if self.explain.top_n == 0 {
            return Err(RiskError::InvalidConfig("explain.top_n must be positive".to_string()));
        }
        let (w_forest, w_boost) = self.model.ensemble_weights;
        if w_forest < 0.0 || w_boost < 0.0 || w_forest + w_boost <= 0.0 {
            return Err(RiskError::InvalidConfig(
                "ensemble weights must be non-negative and not both zero".to_string(),
            ));
        }
        if self.model.forest.n_estimators == 0 || self.model.boosting.n_estimators == 0 {
            return Err(RiskError::InvalidConfig(
                "tree models need at least one estimator".to_string(),
            ));
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_kind_parses_aliases() {
        assert_eq!("bagged-trees".parse::<VariantKind>(), Ok(VariantKind::BaggedTrees));
        assert_eq!("GBDT".parse::<VariantKind>(), Ok(VariantKind::BoostedTrees));
        assert_eq!("mlp".parse::<VariantKind>(), Ok(VariantKind::NeuralNetwork));
        assert!("svm".parse::<VariantKind>().is_err());
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.thresholds.medium, 0.3);
        assert_eq!(cfg.thresholds.high, 0.6);
    }

    #[test]
    fn thresholds_must_be_ordered() {
        assert!(RiskThresholds::new(0.6, 0.3).is_err());
        assert!(RiskThresholds::new(-0.1, 0.5).is_err());
        assert!(RiskThresholds::new(0.0, 0.5).is_ok());
        assert!(RiskThresholds::new(0.4, 0.7).is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{ "test_fraction": 0.25, "thresholds": { "high": 0.7 } }"#)
                .unwrap();
        assert_eq!(cfg.test_fraction, 0.25);
        assert_eq!(cfg.thresholds.high, 0.7);
        assert_eq!(cfg.thresholds.medium, 0.3);
        assert_eq!(cfg.model.forest.n_estimators, 200);
        assert_eq!(cfg.cv_folds, 3);
        assert!(cfg.save_variant_artifacts);
    }

    #[test]
    fn single_fold_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.cv_folds = 1;
        assert!(matches!(cfg.validate(), Err(RiskError::InvalidConfig(_))));
        cfg.cv_folds = 0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn variant_keys_are_distinct_file_stems() {
        let keys: Vec<&str> = VariantKind::ALL.iter().map(|k| k.key()).collect();
        assert_eq!(keys, vec!["bagged_trees", "boosted_trees", "neural_network"]);
        for kind in VariantKind::ALL {
            assert_eq!(kind.key().parse::<VariantKind>(), Ok(kind));
        }
    }
}
