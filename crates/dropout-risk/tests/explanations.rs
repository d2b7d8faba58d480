mod common;

use dropout_risk::artifact::ModelArtifact;
use dropout_risk::config::{ExplainConfig, VariantKind};
use dropout_risk::explain::tree_shap::shap_values;
use dropout_risk::explain::{
    lime, tree_shap, Attributor, ExplainError, ExplanationService, FeatureAttribution,
    LimeAttributor, TreeShapAttributor,
};
use dropout_risk::models::factory::{train_ensemble, train_variant};
use dropout_risk::models::{ClassifierModel, TrainedModel};
use dropout_risk::prediction::{feature_importance, PredictionService};
use dropout_risk::schema::{feature_index, FeatureRecord, FEATURE_COUNT};

use common::*;

fn trained_ensemble() -> (TrainedModel, Vec<[f64; FEATURE_COUNT]>, Vec<Student>) {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let students = synthetic_students(300, 21);
    let model = train_ensemble(&dataset(&students), &config.model).unwrap();
    let background = rows(&students)[..100].to_vec();
    (model, background, students)
}

#[test]
fn ensemble_shap_values_add_up_to_the_score() {
    let (model, _, students) = trained_ensemble();
    for record in [strong_student(), weak_student()]
        .into_iter()
        .chain(students.iter().take(10).map(|s| s.record))
    {
        let x = record.to_array();
        let sv = shap_values(&model, &x).unwrap();
        let total = sv.base + sv.values.iter().sum::<f64>();
        assert!(
            (total - model.predict_proba(&x)).abs() < 1e-6,
            "{} vs {}",
            total,
            model.predict_proba(&x)
        );
    }
}

#[test]
fn shap_values_point_the_right_way() {
    let (model, _, students) = trained_ensemble();

    let weak = shap_values(&model, &weak_student().to_array()).unwrap();
    let strong = shap_values(&model, &strong_student().to_array()).unwrap();
    assert!(weak.values.iter().sum::<f64>() > 0.0);
    assert!(strong.values.iter().sum::<f64>() < 0.0);

    let debtor = feature_index("debtor").unwrap();
    let debtors: Vec<&FeatureRecord> = students
        .iter()
        .map(|s| &s.record)
        .filter(|r| r.debtor == 1.0)
        .collect();
    assert!(!debtors.is_empty());
    let pushed_up = debtors
        .iter()
        .filter(|r| shap_values(&model, &r.to_array()).unwrap().values[debtor] > 0.0)
        .count();
    assert!(
        pushed_up * 10 >= debtors.len() * 7,
        "{} of {} debtors",
        pushed_up,
        debtors.len()
    );
}

#[test]
fn seeded_lime_is_repeatable_and_describes_bins() {
    let (model, background, _) = trained_ensemble();
    let lime = LimeAttributor::new(400, None, Some(42));
    let record = weak_student();

    let first = lime.attribute(&record, &model, &background).unwrap();
    let second = lime.attribute(&record, &model, &background).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), FEATURE_COUNT);
    for a in &first {
        assert!(a.attribution.is_finite());
        let condition = a.condition.as_deref().unwrap();
        assert!(condition.contains(&a.name), "{}", condition);
        assert_eq!(Some(a.raw_value), record.value(&a.name));
    }

    let other_seed = LimeAttributor::new(400, None, Some(7))
        .attribute(&record, &model, &background)
        .unwrap();
    assert_ne!(first, other_seed);
}

#[test]
fn unseeded_lime_agrees_with_itself() {
    let (model, background, _) = trained_ensemble();
    let lime = LimeAttributor::new(2000, None, None);
    let record = weak_student();

    let ranked = |mut attributions: Vec<FeatureAttribution>| {
        attributions.sort_by(|a, b| b.attribution.abs().total_cmp(&a.attribution.abs()));
        attributions
    };
    let first = ranked(lime.attribute(&record, &model, &background).unwrap());
    let second = ranked(lime.attribute(&record, &model, &background).unwrap());

    let top3 = |run: &[FeatureAttribution]| -> Vec<String> {
        run.iter().take(3).map(|a| a.name.clone()).collect()
    };
    assert!(top3(&second).contains(&first[0].name), "{:?} vs {:?}", first, second);
    assert!(top3(&first).contains(&second[0].name), "{:?} vs {:?}", first, second);

    for a in first.iter().take(3) {
        let b = second.iter().find(|b| b.name == a.name).unwrap();
        assert_eq!(
            a.attribution.signum(),
            b.attribution.signum(),
            "{}: {} vs {}",
            a.name,
            a.attribution,
            b.attribution
        );
    }
    for a in &first {
        let b = second.iter().find(|b| b.name == a.name).unwrap();
        assert!(
            (a.attribution - b.attribution).abs() < 0.1,
            "{}: {} vs {}",
            a.name,
            a.attribution,
            b.attribution
        );
    }
}

#[test]
fn ensemble_importance_ranks_the_risk_drivers_first() {
    let (model, _, _) = trained_ensemble();
    let importances = model.feature_importances().unwrap();
    assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    assert!(importances.iter().all(|&v| v >= 0.0));

    let drivers = [
        "debtor",
        "tuition_fees_up_to_date",
        "curricular_units_1st_sem_grade",
        "curricular_units_2nd_sem_grade",
    ];
    let ranked = feature_importance(&model);
    assert_eq!(ranked.len(), FEATURE_COUNT);
    assert!(ranked.windows(2).all(|w| w[0].importance >= w[1].importance));
    assert!(drivers.contains(&ranked[0].name.as_str()), "{:?}", ranked);
    let driver_share: f64 = drivers
        .iter()
        .map(|name| importances[feature_index(name).unwrap()])
        .sum();
    assert!(driver_share > 0.5, "{:?}", ranked);
}

#[test]
fn lime_without_background_is_an_error() {
    let (model, _, _) = trained_ensemble();
    let err = LimeAttributor::default()
        .attribute(&weak_student(), &model, &[])
        .unwrap_err();
    assert_eq!(err, ExplainError::MissingBackground);
}

struct Broken;

impl Attributor for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn attribute(
        &self,
        _record: &FeatureRecord,
        _model: &TrainedModel,
        _background: &[[f64; FEATURE_COUNT]],
    ) -> Result<Vec<FeatureAttribution>, ExplainError> {
        Err(ExplainError::Numerical("singular system".to_string()))
    }
}

#[test]
fn failing_method_degrades_to_empty_list() {
    let (model, background, _) = trained_ensemble();
    let service = ExplanationService::with_attributors(
        vec![Box::new(Broken), Box::new(TreeShapAttributor)],
        3,
    );

    let explanation = service.explain(&weak_student(), &model, &background);
    assert_eq!(explanation.methods.len(), 2);
    assert!(explanation.method("broken").unwrap().is_empty());
    let shap = explanation.method(tree_shap::METHOD_NAME).unwrap();
    assert_eq!(shap.len(), 3);
    assert!(shap
        .windows(2)
        .all(|w| w[0].attribution.abs() >= w[1].attribution.abs()));
    assert_eq!(explanation.primary().unwrap().method, tree_shap::METHOD_NAME);
}

#[test]
fn assessment_uses_tree_shap_for_the_ensemble() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let (model, background, _) = trained_ensemble();
    ModelArtifact::new(model, background)
        .persist(&config.model_path)
        .unwrap();

    let service = PredictionService::from_path(&config.model_path, config.thresholds).unwrap();
    let explainer = ExplanationService::new(&config.explain);
    let assessment = service.assess(&weak_student(), &explainer).unwrap();

    let top = &assessment.prediction.top_features;
    assert_eq!(top.len(), config.explain.top_n);
    let shap = assessment.explanation.method(tree_shap::METHOD_NAME).unwrap();
    assert_eq!(top[0].name, shap[0].name);
    assert_eq!(top[0].attribution_value, shap[0].attribution);
    assert!(top.iter().all(|f| f.label.chars().next().unwrap().is_uppercase()));
    assert_eq!(
        assessment.explanation.method(lime::METHOD_NAME).unwrap().len(),
        config.explain.top_n
    );

    let importance = &assessment.feature_importance;
    assert_eq!(importance.len(), FEATURE_COUNT);
    assert!(importance.windows(2).all(|w| w[0].importance >= w[1].importance));
    let total: f64 = importance.iter().map(|f| f.importance).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn neural_network_falls_back_to_lime() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.explain = ExplainConfig {
        top_n: 4,
        lime_samples: 300,
        lime_seed: Some(1),
        ..ExplainConfig::default()
    };
    let students = synthetic_students(200, 4);
    let model =
        train_variant(&dataset(&students), VariantKind::NeuralNetwork, &config.model).unwrap();
    ModelArtifact::new(model, rows(&students)[..60].to_vec())
        .persist(&config.model_path)
        .unwrap();

    let service = PredictionService::from_path(&config.model_path, config.thresholds).unwrap();
    let assessment = service
        .assess(&weak_student(), &ExplanationService::new(&config.explain))
        .unwrap();

    assert!(assessment
        .explanation
        .method(tree_shap::METHOD_NAME)
        .unwrap()
        .is_empty());
    let lime = assessment.explanation.method(lime::METHOD_NAME).unwrap();
    assert_eq!(lime.len(), 4);
    assert_eq!(assessment.prediction.top_features.len(), 4);
    assert_eq!(assessment.prediction.top_features[0].name, lime[0].name);
    assert!(assessment.feature_importance.is_empty());
}
