//! Train and deploy the dropout risk ensemble.
//!
//! Takes no arguments. The configuration is read from `$DROPOUT_RISK_CONFIG` when
//! set, otherwise defaults apply.
use std::path::PathBuf;

use log::LevelFilter;

use dropout_risk_cli::train::run_training;
use dropout_risk_cli::util::load_config;

fn main() {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or(
            "DROPOUT_RISK_LOG",
            "error,dropout_risk=info,dropout_risk_cli=info",
        ))
        .init();

    let config_path = std::env::var_os("DROPOUT_RISK_CONFIG").map(PathBuf::from);
    let outcome = load_config(config_path.as_deref()).and_then(|config| run_training(&config));

    match outcome {
        Ok(summary) => println!("{}", summary),
        Err(e) => {
            log::error!("Training failed: {:#}", e);
            std::process::exit(1)
        }
    }
}
