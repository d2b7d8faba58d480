use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dropout_risk::config::ModelConfig;
use dropout_risk::data_handling::{split_train_test, TrainingDataset};
use dropout_risk::explain::tree_shap::shap_values;
use dropout_risk::models::factory::train_ensemble;
use dropout_risk::models::ClassifierModel;
use dropout_risk::schema::{FeatureRecord, FEATURE_NAMES};
use dropout_risk::trainer::evaluate;

fn main() {
    env_logger::init();

    // Synthetic cohort: debt, unpaid fees and low grades drive dropout
    let mut rng = StdRng::seed_from_u64(7);
    let mut records = Vec::new();
    let mut labels = Vec::new();
    for _ in 0..500 {
        let grade: f64 = rng.gen_range(8.0..17.0);
        let record = FeatureRecord {
            previous_qualification: 1.0,
            age_at_enrollment: f64::from(rng.gen_range(18u8..35)),
            scholarship_holder: f64::from(u8::from(rng.gen_bool(0.3))),
            debtor: f64::from(u8::from(rng.gen_bool(0.15))),
            tuition_fees_up_to_date: f64::from(u8::from(rng.gen_bool(0.85))),
            curricular_units_1st_sem_grade: grade,
            curricular_units_2nd_sem_grade: grade + rng.gen_range(-1.0..1.0),
            gdp: rng.gen_range(-4.0..3.5),
        };
        let logit = 2.0 * record.debtor + 2.5 * (1.0 - record.tuition_fees_up_to_date)
            - 0.7 * (grade - 12.5)
            - 1.0;
        labels.push(u8::from(logit + rng.gen_range(-1.0..1.0) > 0.0));
        records.push(record);
    }
    let dataset = TrainingDataset::new(records, labels).expect("consistent dataset");
    let (train, test) = split_train_test(&dataset, 0.2, 42).expect("split");

    let mut config = ModelConfig::default();
    config.forest.n_estimators = 50;
    let model = train_ensemble(&train, &config).expect("training");
    let eval = evaluate(&model, &test).expect("evaluation");
    println!("Ensemble accuracy={:.3} auc={:.3}", eval.accuracy, eval.auc);

    let x = test.records[0].to_array();
    let sv = shap_values(&model, &x).expect("tree model");
    println!("Risk score {:.3} (base {:.3})", model.predict_proba(&x), sv.base);
    for (name, value) in FEATURE_NAMES.iter().zip(sv.values) {
        println!("  {:<32} {:+.4}", name, value);
    }

    if let Some(importances) = model.feature_importances() {
        println!("Global importance:");
        for (name, value) in FEATURE_NAMES.iter().zip(importances) {
            println!("  {:<32} {:.4}", name, value);
        }
    }
}
