pub mod input;
pub mod output;

use anyhow::{Context, Result};

use dropout_risk::config::PipelineConfig;
use dropout_risk::explain::ExplanationService;
use dropout_risk::prediction::{Assessment, PredictionService};
use dropout_risk::schema::FeatureRecord;

/// Score and explain one record against the configured model artifact.
pub fn run_prediction(config: &PipelineConfig, record: &FeatureRecord) -> Result<Assessment> {
    let service = PredictionService::from_path(&config.model_path, config.thresholds)
        .context("Invalid risk thresholds")?;
    let explainer = ExplanationService::new(&config.explain);
    let assessment = service
        .assess(record, &explainer)
        .with_context(|| format!("Prediction with {} failed", config.model_path.display()))?;
    log::info!("{}", output::summarize(&assessment));
    Ok(assessment)
}
