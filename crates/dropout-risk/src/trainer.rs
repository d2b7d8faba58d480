//! Training run: load, split, fit every variant, evaluate on the held-out
//! partition (plus k-fold accuracy on the training partition) and persist the
//! comparison report, per-variant artifacts and finally the deployed ensemble.
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::artifact::{sample_background, write_atomically, ModelArtifact};
use crate::config::{PipelineConfig, VariantKind};
use crate::data_handling::{stratified_folds, DataLoader, TrainingDataset};
use crate::error::{Result, RiskError};
use crate::metrics::{accuracy, evaluate_scores, CrossValidation, Evaluation};
use crate::models::factory::{combine_ensemble, train_ensemble, train_variant};
use crate::models::{ClassifierModel, TrainedModel};
use crate::report::training_report;

/// File stem of the ensemble's own artifact.
pub const ENSEMBLE_STEM: &str = "ensemble";

/// Model label -> test metrics.
pub type ModelComparisonReport = BTreeMap<String, Evaluation>;

/// Score `model` on the held-out partition.
pub fn evaluate(model: &TrainedModel, test: &TrainingDataset) -> Result<Evaluation> {
    if test.is_empty() {
        return Err(RiskError::DataUnavailable("test partition is empty".to_string()));
    }
    let scores = model.predict_proba_batch(&test.features());
    evaluate_scores(&scores, &test.labels).ok_or_else(|| {
        RiskError::DataUnavailable(
            "test partition holds a single class; AUC is undefined".to_string(),
        )
    })
}

/// Write the comparison report as pretty JSON.
pub fn save_comparison(report: &ModelComparisonReport, path: &Path) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(report)
        .map_err(|e| RiskError::Persist(format!("failed to encode comparison: {}", e)))?;
    write_atomically(path, &bytes)?;
    log::info!("Saved model comparison to {}", path.display());
    Ok(())
}

/// Stratified k-fold accuracy of the models produced by `fit`, scored on each
/// held-out fold of `train`.
pub fn cross_validate<F>(
    train: &TrainingDataset,
    k: usize,
    seed: u64,
    fit: F,
) -> Result<CrossValidation>
where
    F: Fn(&TrainingDataset) -> Result<TrainedModel>,
{
    let folds = stratified_folds(train, k, seed)?;
    let mut accuracies = Vec::with_capacity(folds.len());
    for held_out in &folds {
        let mut in_fold = vec![false; train.len()];
        held_out.iter().for_each(|&i| in_fold[i] = true);
        let rest: Vec<usize> = (0..train.len()).filter(|&i| !in_fold[i]).collect();

        let model = fit(&train.select(&rest))?;
        let validation = train.select(held_out);
        let scores = model.predict_proba_batch(&validation.features());
        accuracies.push(accuracy(&scores, &validation.labels));
    }
    CrossValidation::from_folds(accuracies)
        .ok_or_else(|| RiskError::DataUnavailable("no fold was scored".to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub comparison: ModelComparisonReport,
    /// Label of the model written to `artifact_path`.
    pub deployed: String,
    /// Highest test accuracy among all evaluated models.
    pub best_by_accuracy: String,
    pub n_train: usize,
    pub n_test: usize,
    pub artifact_path: PathBuf,
    /// Model label -> its own artifact, when variant artifacts are enabled.
    #[serde(default)]
    pub variant_paths: BTreeMap<String, PathBuf>,
    pub comparison_path: PathBuf,
    pub report_path: Option<PathBuf>,
}

impl fmt::Display for TrainingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<20} {:>9} {:>9} {:>9} {:>9} {:>16}",
            "Model", "Accuracy", "AUC", "Precision", "Recall", "CV accuracy"
        )?;
        for (name, eval) in &self.comparison {
            let marker = if *name == self.deployed { " *" } else { "" };
            let cv = match &eval.cross_validation {
                Some(cv) => format!("{:.4} +/- {:.4}", cv.mean_accuracy, cv.std_accuracy),
                None => "-".to_string(),
            };
            writeln!(
                f,
                "{:<20} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>16}{}",
                name, eval.accuracy, eval.auc, eval.precision, eval.recall, cv, marker
            )?;
        }
        writeln!(f, "(* deployed to {})", self.artifact_path.display())?;
        write!(
            f,
            "Trained on {} records, evaluated on {}; best accuracy: {}",
            self.n_train, self.n_test, self.best_by_accuracy
        )
    }
}

pub struct ModelTrainer {
    config: PipelineConfig,
}

impl ModelTrainer {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(ModelTrainer { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full run from the configured dataset file.
    pub fn train_all(&self) -> Result<TrainingSummary> {
        let (train, test) = DataLoader::load_and_prepare(&self.config)?;
        self.train_on(&train, &test)
    }

    /// Train, evaluate and persist from already split partitions.
    ///
    /// Nothing is written until every model has been fitted and evaluated. The
    /// deployed artifact is written last, so a failed run leaves the previously
    /// deployed model in place.
    pub fn train_on(
        &self,
        train: &TrainingDataset,
        test: &TrainingDataset,
    ) -> Result<TrainingSummary> {
        let model_config = &self.config.model;
        let mut comparison = ModelComparisonReport::new();
        let mut fitted = Vec::with_capacity(VariantKind::ALL.len());

        for kind in VariantKind::ALL {
            let start = Instant::now();
            let model = train_variant(train, kind, model_config)?;
            let mut eval = evaluate(&model, test)?;
            eval.cross_validation =
                self.cross_validate(train, |fold| train_variant(fold, kind, model_config))?;
            log::info!(
                "{}: accuracy {:.4}, AUC {:.4} ({:.1?})",
                kind,
                eval.accuracy,
                eval.auc,
                start.elapsed()
            );
            comparison.insert(kind.to_string(), eval);
            fitted.push((kind, model));
        }

        let background = sample_background(
            &train.features(),
            self.config.explain.background_size,
            self.config.split_seed,
        );
        let mut variant_artifacts: Vec<(&str, ModelArtifact)> = Vec::new();
        if self.config.save_variant_artifacts {
            for (kind, model) in &fitted {
                let artifact = ModelArtifact::new(model.clone(), background.clone());
                variant_artifacts.push((kind.key(), artifact));
            }
        }

        let mut forest = None;
        let mut boosting = None;
        for (kind, model) in fitted {
            match kind {
                VariantKind::BaggedTrees => forest = Some(model),
                VariantKind::BoostedTrees => boosting = Some(model),
                // trained for comparison only
                VariantKind::NeuralNetwork => {}
            }
        }
        let (forest, boosting) = forest.zip(boosting).ok_or_else(|| {
            RiskError::InvalidConfig("ensemble members were not trained".to_string())
        })?;
        let ensemble = combine_ensemble(forest, boosting, model_config)?;
        let mut ensemble_eval = evaluate(&ensemble, test)?;
        ensemble_eval.cross_validation =
            self.cross_validate(train, |fold| train_ensemble(fold, model_config))?;
        log::info!(
            "{}: accuracy {:.4}, AUC {:.4}",
            ensemble.label(),
            ensemble_eval.accuracy,
            ensemble_eval.auc
        );
        let deployed = ensemble.label();
        comparison.insert(deployed.clone(), ensemble_eval);

        let best_by_accuracy = comparison
            .iter()
            .max_by(|a, b| a.1.accuracy.total_cmp(&b.1.accuracy))
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| deployed.clone());

        let artifact = ModelArtifact::new(ensemble, background);
        if self.config.save_variant_artifacts {
            variant_artifacts.push((ENSEMBLE_STEM, artifact.clone()));
        }

        save_comparison(&comparison, &self.config.comparison_path)?;
        let variant_paths = self.save_variant_artifacts(&variant_artifacts)?;
        let report_path = match &self.config.html_report_path {
            Some(path) => self.write_report(&comparison, &deployed, train, test, path),
            None => None,
        };
        artifact.persist(&self.config.model_path)?;

        Ok(TrainingSummary {
            comparison,
            deployed,
            best_by_accuracy,
            n_train: train.len(),
            n_test: test.len(),
            artifact_path: self.config.model_path.clone(),
            variant_paths,
            comparison_path: self.config.comparison_path.clone(),
            report_path,
        })
    }

    fn cross_validate<F>(
        &self,
        train: &TrainingDataset,
        fit: F,
    ) -> Result<Option<CrossValidation>>
    where
        F: Fn(&TrainingDataset) -> Result<TrainedModel>,
    {
        if self.config.cv_folds < 2 {
            return Ok(None);
        }
        let cv = cross_validate(train, self.config.cv_folds, self.config.split_seed, fit)?;
        log::debug!(
            "{}-fold accuracy {:.4} +/- {:.4}",
            cv.folds(),
            cv.mean_accuracy,
            cv.std_accuracy
        );
        Ok(Some(cv))
    }

    /// Path of the artifact with file stem `stem`, next to the deployed one.
    pub fn variant_artifact_path(&self, stem: &str) -> PathBuf {
        self.config.model_path.with_file_name(format!("{}.json", stem))
    }

    fn save_variant_artifacts(
        &self,
        artifacts: &[(&str, ModelArtifact)],
    ) -> Result<BTreeMap<String, PathBuf>> {
        let mut paths = BTreeMap::new();
        for (stem, artifact) in artifacts {
            let path = self.variant_artifact_path(stem);
            if path == self.config.model_path {
                log::warn!(
                    "Not writing the {} artifact: {} is the deployed model path",
                    artifact.variant,
                    path.display()
                );
                continue;
            }
            artifact.persist(&path)?;
            paths.insert(artifact.variant.clone(), path);
        }
        Ok(paths)
    }

    /// A failure here is logged and does not fail the run.
    fn write_report(
        &self,
        comparison: &ModelComparisonReport,
        deployed: &str,
        train: &TrainingDataset,
        test: &TrainingDataset,
        path: &Path,
    ) -> Option<PathBuf> {
        let evaluations: Vec<(String, &Evaluation)> =
            comparison.iter().map(|(k, v)| (k.clone(), v)).collect();
        let dataset_summary = format!(
            "{} training records ({} dropout), {} test records ({} dropout).",
            train.len(),
            train.n_positive(),
            test.len(),
            test.n_positive()
        );
        let config_json = match serde_json::to_string_pretty(&self.config) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Configuration left out of the training report: {}", e);
                String::new()
            }
        };
        let report = training_report(&evaluations, deployed, &dataset_summary, &config_json);
        match report.save_to_file(path) {
            Ok(()) => {
                log::info!("Saved training report to {}", path.display());
                Some(path.to_path_buf())
            }
            Err(e) => {
                log::warn!("Training report not written: {}", e);
                None
            }
        }
    }
}

/// Convenience wrapper around [`ModelTrainer::train_all`].
pub fn train_all(config: &PipelineConfig) -> Result<TrainingSummary> {
    ModelTrainer::new(config.clone())?.train_all()
}
