use std::fs;
use std::path::PathBuf;

use dropout_risk::config::PipelineConfig;
use dropout_risk_cli::train::input::TrainOverrides;
use dropout_risk_cli::util::load_config;

#[test]
fn config_file_values_survive_and_missing_keys_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{ "dataset_path": "students.csv", "delimiter": ";", "thresholds": { "medium": 0.25, "high": 0.7 } }"#,
    )
    .unwrap();

    let config = load_config(Some(path.as_path())).unwrap();
    assert_eq!(config.dataset_path, PathBuf::from("students.csv"));
    assert_eq!(config.delimiter, ';');
    assert_eq!(config.thresholds.medium, 0.25);
    assert_eq!(config.model, PipelineConfig::default().model);
    assert_eq!(config.explain.top_n, 3);
}

#[test]
fn invalid_thresholds_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{ "thresholds": { "medium": 0.8, "high": 0.6 } }"#).unwrap();
    let err = load_config(Some(path.as_path())).unwrap_err();
    assert!(format!("{:#}", err).contains("risk thresholds"));
}

#[test]
fn no_config_means_defaults() {
    assert_eq!(load_config(None).unwrap(), PipelineConfig::default());
}

#[test]
fn train_flags_override_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("students.csv");
    fs::write(&data, "a;b\n1;2\n").unwrap();
    let out = dir.path().join("deploy").join("ensemble.json");

    let overrides = TrainOverrides {
        data: Some(data.clone()),
        model_out: Some(out.clone()),
        no_report: true,
    };
    let config = overrides.apply(PipelineConfig::default()).unwrap();

    assert_eq!(config.dataset_path, data);
    assert_eq!(config.model_path, out);
    assert_eq!(
        config.comparison_path,
        dir.path().join("deploy").join("model_comparison.json")
    );
    assert!(config.html_report_path.is_none());
}

#[test]
fn report_follows_model_out() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("students.tsv");
    fs::write(&data, "a\tb\n1\t2\n").unwrap();
    let out = dir.path().join("model.json");

    let config = TrainOverrides {
        data: Some(data),
        model_out: Some(out),
        no_report: false,
    }
    .apply(PipelineConfig::default())
    .unwrap();
    assert_eq!(
        config.html_report_path,
        Some(dir.path().join("training_report.html"))
    );
}

#[test]
fn tsv_dataset_switches_to_tab_delimiter() {
    let dir = tempfile::tempdir().unwrap();
    let tsv = dir.path().join("students.TSV");
    fs::write(&tsv, "a\tb\n1\t2\n").unwrap();
    let csv = dir.path().join("students.csv");
    fs::write(&csv, "a;b\n1;2\n").unwrap();

    let mut semicolon = PipelineConfig::default();
    semicolon.delimiter = ';';

    let config = TrainOverrides {
        data: Some(tsv),
        ..TrainOverrides::default()
    }
    .apply(semicolon.clone())
    .unwrap();
    assert_eq!(config.delimiter, '\t');
    assert_eq!(config.delimiter_byte(), b'\t');

    let config = TrainOverrides {
        data: Some(csv),
        ..TrainOverrides::default()
    }
    .apply(semicolon)
    .unwrap();
    assert_eq!(config.delimiter, ';');
}

#[test]
fn missing_dataset_fails_before_training() {
    let dir = tempfile::tempdir().unwrap();
    let overrides = TrainOverrides {
        data: Some(dir.path().join("absent.csv")),
        ..TrainOverrides::default()
    };
    let err = overrides.apply(PipelineConfig::default()).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}
