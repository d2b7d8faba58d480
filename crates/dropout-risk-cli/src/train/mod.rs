pub mod input;

use anyhow::{Context, Result};

use dropout_risk::config::PipelineConfig;
use dropout_risk::trainer::{ModelTrainer, TrainingSummary};

pub fn run_training(config: &PipelineConfig) -> Result<TrainingSummary> {
    log::info!(
        "Training on {} (model -> {})",
        config.dataset_path.display(),
        config.model_path.display()
    );
    let trainer = ModelTrainer::new(config.clone()).context("Invalid training configuration")?;
    let summary = trainer
        .train_all()
        .with_context(|| format!("Training on {} failed", config.dataset_path.display()))?;
    for (label, path) in &summary.variant_paths {
        log::debug!("{} artifact: {}", label, path.display());
    }
    if let Some(report) = &summary.report_path {
        log::info!("Training report: {}", report.display());
    }
    Ok(summary)
}
