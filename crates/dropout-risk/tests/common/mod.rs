//! Synthetic student data shared by the integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dropout_risk::config::{BoostingParams, ForestParams, MlpParams, PipelineConfig};
use dropout_risk::data_handling::TrainingDataset;
use dropout_risk::schema::{FeatureRecord, FEATURE_COUNT};

/// Raw headers as they appear in the institutional export, plus one column the
/// model does not use.
pub const RAW_HEADERS: [&str; 10] = [
    "Marital status",
    "Previous qualification",
    "Age at enrollment",
    "Scholarship holder",
    "Debtor",
    "Tuition fees up to date",
    "Curricular units 1st sem (grade)",
    "Curricular units 2nd sem (grade)",
    "GDP",
    "Target",
];

pub struct Student {
    pub record: FeatureRecord,
    pub status: &'static str,
}

/// Dropout is driven by debt, unpaid fees, low grades and late enrollment;
/// scholarships protect.
pub fn risk_logit(r: &FeatureRecord) -> f64 {
    let grade = (r.curricular_units_1st_sem_grade + r.curricular_units_2nd_sem_grade) / 2.0;
    2.0 * r.debtor + 2.5 * (1.0 - r.tuition_fees_up_to_date) - 0.7 * (grade - 12.5)
        + 0.1 * (r.age_at_enrollment - 20.0)
        - 0.8 * r.scholarship_holder
        - 1.2
}

pub fn synthetic_students(n: usize, seed: u64) -> Vec<Student> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let grade1: f64 = rng.gen_range(8.0..17.5);
            let record = FeatureRecord {
                previous_qualification: f64::from(rng.gen_range(1u8..4)),
                age_at_enrollment: f64::from(rng.gen_range(18u8..36)),
                scholarship_holder: f64::from(u8::from(rng.gen_bool(0.3))),
                debtor: f64::from(u8::from(rng.gen_bool(0.15))),
                tuition_fees_up_to_date: f64::from(u8::from(rng.gen_bool(0.85))),
                curricular_units_1st_sem_grade: grade1,
                curricular_units_2nd_sem_grade: (grade1 + rng.gen_range(-1.0..1.0)).max(0.0),
                gdp: rng.gen_range(-4.0..3.5),
            };
            let noisy = risk_logit(&record) + rng.gen_range(-1.0..1.0);
            let status = if noisy > 0.0 {
                "Dropout"
            } else if rng.gen_bool(0.7) {
                "Graduate"
            } else {
                "Enrolled"
            };
            Student { record, status }
        })
        .collect()
}

pub fn dataset(students: &[Student]) -> TrainingDataset {
    TrainingDataset::new(
        students.iter().map(|s| s.record).collect(),
        students
            .iter()
            .map(|s| u8::from(s.status == "Dropout"))
            .collect(),
    )
    .unwrap()
}

/// Write students as a `;`-separated export with raw headers.
pub fn write_csv(path: &Path, students: &[Student]) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "{}", RAW_HEADERS.join(";")).unwrap();
    for s in students {
        let r = s.record;
        writeln!(
            file,
            "1;{};{};{};{};{};{:.2};{:.2};{:.2};{}",
            r.previous_qualification,
            r.age_at_enrollment,
            r.scholarship_holder,
            r.debtor,
            r.tuition_fees_up_to_date,
            r.curricular_units_1st_sem_grade,
            r.curricular_units_2nd_sem_grade,
            r.gdp,
            s.status
        )
        .unwrap();
    }
}

/// A configuration small enough for tests, writing everything under `dir`.
pub fn small_config(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.dataset_path = dir.join("dataset.csv");
    config.delimiter = ';';
    config.model_path = dir.join("models").join("model.json");
    config.comparison_path = dir.join("models").join("model_comparison.json");
    config.html_report_path = Some(dir.join("models").join("training_report.html"));
    config.model.forest = ForestParams {
        n_estimators: 40,
        max_depth: 8,
        ..ForestParams::default()
    };
    config.model.boosting = BoostingParams {
        n_estimators: 60,
        ..BoostingParams::default()
    };
    config.model.neural = MlpParams {
        hidden_layers: vec![16, 8],
        epochs: 40,
        ..MlpParams::default()
    };
    config.explain.lime_samples = 400;
    config.explain.lime_seed = Some(42);
    config.explain.background_size = 100;
    config.cv_folds = 2;
    config
}

pub fn model_path(config: &PipelineConfig) -> PathBuf {
    config.model_path.clone()
}

/// Good grades, fees paid, scholarship, no debt.
pub fn strong_student() -> FeatureRecord {
    FeatureRecord {
        previous_qualification: 1.0,
        age_at_enrollment: 19.0,
        scholarship_holder: 1.0,
        debtor: 0.0,
        tuition_fees_up_to_date: 1.0,
        curricular_units_1st_sem_grade: 16.0,
        curricular_units_2nd_sem_grade: 16.5,
        gdp: 1.7,
    }
}

/// Low grades, in debt, fees overdue, late enrollment.
pub fn weak_student() -> FeatureRecord {
    FeatureRecord {
        previous_qualification: 1.0,
        age_at_enrollment: 31.0,
        scholarship_holder: 0.0,
        debtor: 1.0,
        tuition_fees_up_to_date: 0.0,
        curricular_units_1st_sem_grade: 9.0,
        curricular_units_2nd_sem_grade: 8.5,
        gdp: -1.7,
    }
}

pub fn rows(students: &[Student]) -> Vec<[f64; FEATURE_COUNT]> {
    students.iter().map(|s| s.record.to_array()).collect()
}
