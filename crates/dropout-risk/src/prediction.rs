//! Prediction service: lazily loads the deployed artifact once and scores records.
//!
//! The artifact sits behind a `RwLock<Option<Arc<_>>>`. The fast path is a read
//! lock and an `Arc` clone; the first caller (or an explicit `reload`) takes the
//! load mutex and re-checks before loading, so concurrent first calls trigger a
//! single load. A failed load leaves the service uninitialised and the next call
//! tries again.
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactLoader, ModelArtifact, ModelLoader};
use crate::config::RiskThresholds;
use crate::error::{Result, RiskError};
use crate::explain::{display_name, Explanation, ExplanationService};
use crate::models::{ClassifierModel, TrainedModel};
use crate::schema::{FeatureRecord, FEATURE_NAMES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskCategory::Low => "low",
            RiskCategory::Medium => "medium",
            RiskCategory::High => "high",
        };
        f.write_str(label)
    }
}

/// Band a score: below `medium` is low, below `high` is medium, the rest is high.
pub fn categorize(score: f64, thresholds: &RiskThresholds) -> RiskCategory {
    if score >= thresholds.high {
        RiskCategory::High
    } else if score >= thresholds.medium {
        RiskCategory::Medium
    } else {
        RiskCategory::Low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopFeature {
    pub name: String,
    /// Title-cased name for display.
    pub label: String,
    pub attribution_value: f64,
    pub raw_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Probability of dropout, in `[0, 1]`.
    pub risk_score: f64,
    pub risk_category: RiskCategory,
    /// `max(score, 1 - score)`.
    pub confidence: f64,
    pub top_features: Vec<TopFeature>,
}

/// Share of the model's total split gain attributed to one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

/// Importances of `model` ranked highest first. Empty when the model has no split
/// structure to measure.
pub fn feature_importance(model: &TrainedModel) -> Vec<FeatureImportance> {
    let importances = match model.feature_importances() {
        Some(importances) => importances,
        None => return Vec::new(),
    };
    let mut ranked: Vec<FeatureImportance> = FEATURE_NAMES
        .iter()
        .zip(importances)
        .map(|(name, importance)| FeatureImportance {
            name: name.to_string(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

/// A prediction together with every method's explanation and the model's global
/// feature importance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub prediction: PredictionResult,
    pub explanation: Explanation,
    #[serde(default)]
    pub feature_importance: Vec<FeatureImportance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Ready,
}

pub struct PredictionService {
    loader: Box<dyn ModelLoader>,
    thresholds: RiskThresholds,
    artifact: RwLock<Option<Arc<ModelArtifact>>>,
    load_lock: Mutex<()>,
}

impl PredictionService {
    /// Fails with `InvalidConfig` unless `0 <= medium < high <= 1`.
    pub fn new(loader: Box<dyn ModelLoader>, thresholds: RiskThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(PredictionService {
            loader,
            thresholds,
            artifact: RwLock::new(None),
            load_lock: Mutex::new(()),
        })
    }

    /// Service backed by an artifact file.
    pub fn from_path<P: Into<PathBuf>>(path: P, thresholds: RiskThresholds) -> Result<Self> {
        Self::new(Box::new(ArtifactLoader::new(path)), thresholds)
    }

    pub fn state(&self) -> ServiceState {
        if self.artifact.read().is_some() {
            ServiceState::Ready
        } else {
            ServiceState::Uninitialized
        }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Return the loaded artifact, loading it on first use.
    pub fn ensure_loaded(&self) -> Result<Arc<ModelArtifact>> {
        if let Some(artifact) = self.artifact.read().as_ref() {
            return Ok(Arc::clone(artifact));
        }

        let _guard = self.load_lock.lock();
        if let Some(artifact) = self.artifact.read().as_ref() {
            return Ok(Arc::clone(artifact));
        }
        let artifact = self.load()?;
        *self.artifact.write() = Some(Arc::clone(&artifact));
        Ok(artifact)
    }

    /// Load a fresh artifact and swap it in. Predictions already running keep the
    /// artifact they started with; on failure the current one stays in place.
    pub fn reload(&self) -> Result<Arc<ModelArtifact>> {
        let _guard = self.load_lock.lock();
        let artifact = self.load()?;
        *self.artifact.write() = Some(Arc::clone(&artifact));
        Ok(artifact)
    }

    fn load(&self) -> Result<Arc<ModelArtifact>> {
        log::info!("Loading model from {}", self.loader.describe());
        match self.loader.load() {
            Ok(artifact) => {
                log::info!(
                    "Model ready: {} (trained {})",
                    artifact.variant,
                    artifact.trained_at.format("%Y-%m-%d %H:%M:%S")
                );
                Ok(Arc::new(artifact))
            }
            Err(e) => {
                log::error!("Failed to load model from {}: {}", self.loader.describe(), e);
                Err(match e {
                    RiskError::ModelUnavailable(msg) => RiskError::ModelUnavailable(msg),
                    other => RiskError::ModelUnavailable(other.to_string()),
                })
            }
        }
    }

    pub fn predict(&self, record: &FeatureRecord) -> Result<PredictionResult> {
        record.validate()?;
        let artifact = self.ensure_loaded()?;
        self.score(&artifact, record)
    }

    /// Validate a name -> value map against the schema, then predict. An invalid
    /// map never touches (or loads) the model.
    pub fn predict_map(&self, values: &HashMap<String, f64>) -> Result<PredictionResult> {
        let record = FeatureRecord::from_map(values)?;
        self.predict(&record)
    }

    /// Predict and explain. `top_features` comes from the first explanation method
    /// that produced attributions.
    pub fn assess(
        &self,
        record: &FeatureRecord,
        explainer: &ExplanationService,
    ) -> Result<Assessment> {
        record.validate()?;
        let artifact = self.ensure_loaded()?;
        let mut prediction = self.score(&artifact, record)?;
        let explanation = explainer.explain(record, &artifact.model, &artifact.background);
        if let Some(primary) = explanation.primary() {
            prediction.top_features = primary
                .attributions
                .iter()
                .map(|a| TopFeature {
                    name: a.name.clone(),
                    label: display_name(&a.name),
                    attribution_value: a.attribution,
                    raw_value: a.raw_value,
                })
                .collect();
        }
        Ok(Assessment {
            prediction,
            explanation,
            feature_importance: feature_importance(&artifact.model),
        })
    }

    fn score(&self, artifact: &ModelArtifact, record: &FeatureRecord) -> Result<PredictionResult> {
        let raw = artifact.model.predict_proba(&record.to_array());
        if !raw.is_finite() {
            return Err(RiskError::ModelUnavailable(format!(
                "{} produced a non-finite score",
                artifact.variant
            )));
        }
        let risk_score = raw.clamp(0.0, 1.0);
        Ok(PredictionResult {
            risk_score,
            risk_category: categorize(risk_score, &self.thresholds),
            confidence: risk_score.max(1.0 - risk_score),
            top_features: Vec::new(),
        })
    }
}
