use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;

use dropout_risk_cli::predict::input::read_record;
use dropout_risk_cli::predict::output::render_assessment;
use dropout_risk_cli::predict::{self, run_prediction};
use dropout_risk_cli::train::{self, run_training};
use dropout_risk_cli::util::default_config_json;

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or(
            "DROPOUT_RISK_LOG",
            "error,dropout_risk=info,dropout_risk_cli=info",
        ))
        .init();

    let matches = Command::new("dropout-risk")
        .version(clap::crate_version!())
        .about("Student dropout risk: train the ensemble and score individual students")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("train")
                .about("Train every model variant and deploy the soft-voting ensemble")
                .arg(
                    Arg::new("config")
                        .help("Path to the pipeline JSON configuration file")
                        .required(false)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("data")
                        .short('d')
                        .long("data")
                        .help(
                            "Path to the student dataset (*.csv or *.tsv). \
                             Overrides the dataset specified in the configuration file.",
                        )
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("model_out")
                        .short('o')
                        .long("model-out")
                        .help(
                            "File path the model artifact will be written to. The comparison \
                             and report are written next to it.",
                        )
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("no_report")
                        .long("no-report")
                        .help("Disable HTML report generation.")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("predict")
                .about("Score one student record and explain the score")
                .arg(
                    Arg::new("record")
                        .help("Path to a JSON object of feature name -> value")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("Path to the pipeline JSON configuration file")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .help("Path to the model artifact. Overrides the configuration file.")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("top_n")
                        .short('n')
                        .long("top-n")
                        .help("Number of features reported per explanation method.")
                        .value_parser(clap::value_parser!(usize))
                        .value_hint(ValueHint::Other),
                ),
        )
        .subcommand(Command::new("config").about("Print the default configuration as JSON"))
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    match matches.subcommand() {
        Some(("train", sub_m)) => handle_train(sub_m),
        Some(("predict", sub_m)) => handle_predict(sub_m),
        Some(("config", _)) => {
            println!("{}", default_config_json()?);
            Ok(())
        }
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
}

fn handle_train(matches: &ArgMatches) -> Result<()> {
    let config_path: Option<&PathBuf> = matches.get_one("config");
    let config = match train::input::from_arguments(config_path, matches) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1)
        }
    };

    match run_training(&config) {
        Ok(summary) => {
            println!("{}", summary);
            Ok(())
        }
        Err(e) => {
            log::error!("Training failed: {:#}", e);
            std::process::exit(1)
        }
    }
}

fn handle_predict(matches: &ArgMatches) -> Result<()> {
    let outcome = predict::input::from_arguments(matches).and_then(|config| {
        let record_path: &PathBuf = matches
            .get_one("record")
            .ok_or_else(|| anyhow::anyhow!("missing record argument"))?;
        let record = read_record(record_path)?;
        run_prediction(&config, &record)
    });

    match outcome {
        Ok(assessment) => {
            println!("{}", render_assessment(&assessment)?);
            Ok(())
        }
        Err(e) => {
            log::error!("Prediction failed: {:#}", e);
            std::process::exit(1)
        }
    }
}
