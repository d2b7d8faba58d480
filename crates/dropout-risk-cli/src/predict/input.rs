use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;

use dropout_risk::config::PipelineConfig;
use dropout_risk::data_handling::normalize_column_name;
use dropout_risk::schema::FeatureRecord;

use crate::util::load_config;

/// Read one student record from a JSON object of feature name -> value.
///
/// Keys may use the raw export headers ("Age at enrollment"); they are normalized
/// the same way as dataset columns.
pub fn read_record<P: AsRef<Path>>(path: P) -> Result<FeatureRecord> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read record: {}", path.display()))?;
    let raw: HashMap<String, f64> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse record: {}", path.display()))?;
    let mut values: HashMap<String, f64> = HashMap::with_capacity(raw.len());
    for (name, value) in raw {
        let normalized = normalize_column_name(&name);
        if values.insert(normalized.clone(), value).is_some() {
            anyhow::bail!(
                "Record {} names feature '{}' more than once (\"{}\" duplicates it after normalization)",
                path.display(),
                normalized,
                name
            );
        }
    }
    let record = FeatureRecord::from_map(&values)
        .with_context(|| format!("Record {} does not match the feature schema", path.display()))?;
    Ok(record)
}

/// Read the configuration file (if any) and apply the `predict` flags.
pub fn from_arguments(matches: &ArgMatches) -> Result<PipelineConfig> {
    let config_path = matches.get_one::<PathBuf>("config");
    let mut config = load_config(config_path.map(PathBuf::as_path))?;
    if let Some(model) = matches.get_one::<PathBuf>("model") {
        config.model_path = model.clone();
    }
    if let Some(top_n) = matches.get_one::<usize>("top_n") {
        if *top_n == 0 {
            anyhow::bail!("--top-n must be at least 1");
        }
        config.explain.top_n = *top_n;
    }
    Ok(config)
}
