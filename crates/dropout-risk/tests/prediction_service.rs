mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dropout_risk::artifact::{ModelArtifact, ModelLoader};
use dropout_risk::config::{ModelConfig, RiskThresholds, VariantKind};
use dropout_risk::error::{Result, RiskError};
use dropout_risk::models::factory::train_variant;
use dropout_risk::models::ClassifierModel;
use dropout_risk::prediction::{PredictionService, RiskCategory, ServiceState};

use common::*;

/// Hands out prepared artifacts in order and counts the loads.
struct CountingLoader {
    artifacts: Vec<ModelArtifact>,
    loads: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay: Duration,
}

impl CountingLoader {
    fn new(artifacts: Vec<ModelArtifact>) -> Self {
        CountingLoader {
            artifacts,
            loads: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
            delay: Duration::from_millis(0),
        }
    }
}

impl ModelLoader for CountingLoader {
    fn load(&self) -> Result<ModelArtifact> {
        thread::sleep(self.delay);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RiskError::Persist("disk on fire".to_string()));
        }
        let n = self.loads.fetch_add(1, Ordering::SeqCst);
        let pick = n.min(self.artifacts.len() - 1);
        Ok(self.artifacts[pick].clone())
    }

    fn describe(&self) -> String {
        "test loader".to_string()
    }
}

fn small_model_config(seed: u64) -> ModelConfig {
    let mut config = ModelConfig::default();
    config.seed = seed;
    config.boosting.n_estimators = 30;
    config
}

fn boosted_artifact(data_seed: u64) -> ModelArtifact {
    let students = synthetic_students(200, data_seed);
    let model = train_variant(
        &dataset(&students),
        VariantKind::BoostedTrees,
        &small_model_config(1),
    )
    .unwrap();
    ModelArtifact::new(model, rows(&students)[..30].to_vec())
}

#[test]
fn concurrent_first_calls_load_once() {
    let mut loader = CountingLoader::new(vec![boosted_artifact(1)]);
    loader.delay = Duration::from_millis(50);
    let loads = Arc::clone(&loader.loads);
    let service = Arc::new(
        PredictionService::new(Box::new(loader), RiskThresholds::default()).unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let record = if i % 2 == 0 { strong_student() } else { weak_student() };
                service.predict(&record).unwrap().risk_score
            })
        })
        .collect();
    let scores: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(service.state(), ServiceState::Ready);
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    assert_eq!(scores[0], scores[2]);
}

#[test]
fn schema_mismatch_never_loads_the_model() {
    let loader = CountingLoader::new(vec![boosted_artifact(1)]);
    let loads = Arc::clone(&loader.loads);
    let service = PredictionService::new(Box::new(loader), RiskThresholds::default()).unwrap();

    let mut values = strong_student().to_map();
    values.remove("debtor");
    assert!(matches!(
        service.predict_map(&values),
        Err(RiskError::SchemaMismatch(_))
    ));

    let mut extra = strong_student().to_map();
    extra.insert("marital_status".to_string(), 1.0);
    assert!(matches!(
        service.predict_map(&extra),
        Err(RiskError::SchemaMismatch(_))
    ));

    let mut nan = strong_student();
    nan.gdp = f64::NAN;
    assert!(matches!(
        service.predict(&nan),
        Err(RiskError::SchemaMismatch(_))
    ));

    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(service.state(), ServiceState::Uninitialized);

    let ok: HashMap<String, f64> = strong_student().to_map();
    service.predict_map(&ok).unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_load_is_retried_on_next_call() {
    let loader = CountingLoader::new(vec![boosted_artifact(1)]);
    let failing = Arc::clone(&loader.failing);
    failing.store(true, Ordering::SeqCst);
    let service = PredictionService::new(Box::new(loader), RiskThresholds::default()).unwrap();

    match service.predict(&weak_student()) {
        Err(RiskError::ModelUnavailable(msg)) => assert!(msg.contains("disk on fire")),
        other => panic!("expected ModelUnavailable, got {:?}", other),
    }
    assert_eq!(service.state(), ServiceState::Uninitialized);

    failing.store(false, Ordering::SeqCst);
    service.predict(&weak_student()).unwrap();
    assert_eq!(service.state(), ServiceState::Ready);
}

#[test]
fn missing_artifact_file_is_model_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let service =
        PredictionService::from_path(dir.path().join("absent.json"), RiskThresholds::default())
            .unwrap();
    assert!(matches!(
        service.predict(&strong_student()),
        Err(RiskError::ModelUnavailable(_))
    ));
    assert_eq!(service.state(), ServiceState::Uninitialized);
}

#[test]
fn reload_swaps_model_and_keeps_old_one_on_failure() {
    let first = boosted_artifact(1);
    let second = boosted_artifact(2);
    let x = weak_student().to_array();
    let (p_first, p_second) = (first.model.predict_proba(&x), second.model.predict_proba(&x));
    assert_ne!(p_first, p_second);

    let loader = CountingLoader::new(vec![first, second]);
    let failing = Arc::clone(&loader.failing);
    let service = PredictionService::new(Box::new(loader), RiskThresholds::default()).unwrap();

    let held = service.ensure_loaded().unwrap();
    assert_eq!(service.predict(&weak_student()).unwrap().risk_score, p_first);

    service.reload().unwrap();
    assert_eq!(service.predict(&weak_student()).unwrap().risk_score, p_second);
    // callers holding the old artifact keep using it
    assert_eq!(held.model.predict_proba(&x), p_first);

    failing.store(true, Ordering::SeqCst);
    assert!(service.reload().is_err());
    assert_eq!(service.state(), ServiceState::Ready);
    assert_eq!(service.predict(&weak_student()).unwrap().risk_score, p_second);
}

#[test]
fn custom_thresholds_change_categories() {
    let artifact = boosted_artifact(1);
    let score = artifact.model.predict_proba(&weak_student().to_array());
    let high = (score + 1.0) / 2.0;
    let medium = score / 2.0;
    let service = PredictionService::new(
        Box::new(CountingLoader::new(vec![artifact])),
        RiskThresholds::new(medium, high).unwrap(),
    )
    .unwrap();
    assert_eq!(
        service.predict(&weak_student()).unwrap().risk_category,
        RiskCategory::Medium
    );
}
