//! Fixed feature schema shared by training and serving.
//!
//! The model is trained on exactly [`FEATURE_COUNT`] columns in the order given by
//! [`FEATURE_NAMES`]. [`FeatureRecord`] is the only way feature values enter the
//! pipeline, so a record that reaches a model always has every field in the right
//! slot.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};

pub const FEATURE_COUNT: usize = 8;

/// Normalized column names, in model input order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "previous_qualification",
    "age_at_enrollment",
    "scholarship_holder",
    "debtor",
    "tuition_fees_up_to_date",
    "curricular_units_1st_sem_grade",
    "curricular_units_2nd_sem_grade",
    "gdp",
];

/// Normalized name of the raw status column.
pub const TARGET_COLUMN: &str = "target";

pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|&n| n == name)
}

/// Schema names as owned strings, as recorded in persisted artifacts.
pub fn schema_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Check that a persisted schema matches the compiled one exactly.
pub fn validate_schema(names: &[String]) -> Result<()> {
    if names.len() != FEATURE_COUNT {
        return Err(RiskError::SchemaMismatch(format!(
            "expected {} features, artifact declares {}",
            FEATURE_COUNT,
            names.len()
        )));
    }
    for (i, (got, want)) in names.iter().zip(FEATURE_NAMES.iter()).enumerate() {
        if got != want {
            return Err(RiskError::SchemaMismatch(format!(
                "feature {} is '{}', expected '{}'",
                i, got, want
            )));
        }
    }
    Ok(())
}

/// One student's model inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub previous_qualification: f64,
    pub age_at_enrollment: f64,
    pub scholarship_holder: f64,
    pub debtor: f64,
    pub tuition_fees_up_to_date: f64,
    pub curricular_units_1st_sem_grade: f64,
    pub curricular_units_2nd_sem_grade: f64,
    pub gdp: f64,
}

impl FeatureRecord {
    /// Build a record from values in schema order.
    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        FeatureRecord {
            previous_qualification: values[0],
            age_at_enrollment: values[1],
            scholarship_holder: values[2],
            debtor: values[3],
            tuition_fees_up_to_date: values[4],
            curricular_units_1st_sem_grade: values[5],
            curricular_units_2nd_sem_grade: values[6],
            gdp: values[7],
        }
    }

    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.previous_qualification,
            self.age_at_enrollment,
            self.scholarship_holder,
            self.debtor,
            self.tuition_fees_up_to_date,
            self.curricular_units_1st_sem_grade,
            self.curricular_units_2nd_sem_grade,
            self.gdp,
        ]
    }

    /// Build a record from a name -> value map.
    ///
    /// Every schema field must be present and finite. Unknown keys are rejected
    /// as well, since they usually mean the caller is on a different schema.
    pub fn from_map(values: &HashMap<String, f64>) -> Result<Self> {
        let missing: Vec<&str> = FEATURE_NAMES
            .iter()
            .copied()
            .filter(|name| !values.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(RiskError::SchemaMismatch(format!(
                "missing features: {}",
                missing.join(", ")
            )));
        }

        let mut unexpected: Vec<&str> = values
            .keys()
            .map(String::as_str)
            .filter(|key| feature_index(key).is_none())
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort_unstable();
            return Err(RiskError::SchemaMismatch(format!(
                "unexpected features: {}",
                unexpected.join(", ")
            )));
        }

        let mut out = [0.0; FEATURE_COUNT];
        for (slot, name) in out.iter_mut().zip(FEATURE_NAMES.iter()) {
            *slot = values[*name];
        }
        let record = FeatureRecord::from_array(out);
        record.validate()?;
        Ok(record)
    }

    /// Reject NaN and infinite values.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.to_array()) {
            if !value.is_finite() {
                return Err(RiskError::SchemaMismatch(format!(
                    "feature '{}' is not a finite number ({})",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|i| self.to_array()[i])
    }

    pub fn to_map(&self) -> HashMap<String, f64> {
        FEATURE_NAMES
            .iter()
            .zip(self.to_array())
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}
