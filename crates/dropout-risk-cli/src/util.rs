use std::path::Path;

use anyhow::{Context, Result};

use dropout_risk::config::PipelineConfig;

/// Load the pipeline configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            log::info!("Using config: {}", path.display());
            PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))
        }
        None => {
            log::info!("No config provided; using defaults.");
            Ok(PipelineConfig::default())
        }
    }
}

pub fn validate_tsv_or_csv_file(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    match ext.as_deref() {
        Some("tsv") | Some("csv") => {}
        _ => anyhow::bail!("File must have a .tsv or .csv extension: {}", path.display()),
    }

    if !path.exists() {
        anyhow::bail!("File does not exist: {}", path.display());
    }

    Ok(())
}

pub fn default_config_json() -> Result<String> {
    serde_json::to_string_pretty(&PipelineConfig::default())
        .context("Failed to encode default config")
}
