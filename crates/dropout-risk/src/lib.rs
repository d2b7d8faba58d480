//! dropout-risk: student dropout risk scoring.
//!
//! The crate covers the whole scoring pipeline: dataset preparation, training and
//! evaluation of tree ensembles (plus a neural baseline), an atomically persisted
//! model artifact, a lazily loaded prediction service with configurable risk
//! bands, and per-feature explanations (TreeSHAP and a local surrogate).
//!
//! Typical serving use:
//!
//! ```no_run
//! use dropout_risk::config::PipelineConfig;
//! use dropout_risk::explain::ExplanationService;
//! use dropout_risk::prediction::PredictionService;
//! use dropout_risk::schema::FeatureRecord;
//!
//! # fn main() -> dropout_risk::error::Result<()> {
//! let config = PipelineConfig::default();
//! let service = PredictionService::from_path(&config.model_path, config.thresholds)?;
//! let explainer = ExplanationService::new(&config.explain);
//! let record = FeatureRecord::from_array([1.0, 19.0, 1.0, 0.0, 1.0, 13.5, 14.0, 1.74]);
//! let assessment = service.assess(&record, &explainer)?;
//! println!("{} ({:.2})", assessment.prediction.risk_category, assessment.prediction.risk_score);
//! # Ok(())
//! # }
//! ```
pub mod artifact;
pub mod config;
pub mod data_handling;
pub mod error;
pub mod explain;
pub mod metrics;
pub mod models;
pub mod prediction;
pub mod preprocessing;
pub mod report;
pub mod schema;
pub mod trainer;
