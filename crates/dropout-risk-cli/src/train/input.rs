use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::ArgMatches;

use dropout_risk::config::PipelineConfig;

use crate::util::{load_config, validate_tsv_or_csv_file};

/// Flags of the `train` subcommand that override the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainOverrides {
    pub data: Option<PathBuf>,
    pub model_out: Option<PathBuf>,
    pub no_report: bool,
}

impl TrainOverrides {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        TrainOverrides {
            data: matches.get_one::<PathBuf>("data").cloned(),
            model_out: matches.get_one::<PathBuf>("model_out").cloned(),
            no_report: matches.get_flag("no_report"),
        }
    }

    pub fn apply(&self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        if let Some(data) = &self.data {
            config.dataset_path = data.clone();
        }
        validate_tsv_or_csv_file(&config.dataset_path)?;
        if is_tsv(&config.dataset_path) && config.delimiter != '\t' {
            log::info!(
                "{} is tab separated; ignoring configured delimiter '{}'",
                config.dataset_path.display(),
                config.delimiter
            );
            config.delimiter = '\t';
        }

        if let Some(model_out) = &self.model_out {
            // keep the comparison and report next to the model
            if let Some(dir) = model_out.parent() {
                if let Some(name) = config.comparison_path.file_name() {
                    config.comparison_path = dir.join(name);
                }
                if let Some(report) = &config.html_report_path {
                    if let Some(name) = report.file_name() {
                        config.html_report_path = Some(dir.join(name));
                    }
                }
            }
            config.model_path = model_out.clone();
        }

        if self.no_report {
            config.html_report_path = None;
        }
        Ok(config)
    }
}

fn is_tsv(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("tsv"))
}

/// Read the configuration file (if any) and apply the `train` flags.
pub fn from_arguments(config_path: Option<&PathBuf>, matches: &ArgMatches) -> Result<PipelineConfig> {
    let config = load_config(config_path.map(PathBuf::as_path))?;
    TrainOverrides::from_matches(matches).apply(config)
}
