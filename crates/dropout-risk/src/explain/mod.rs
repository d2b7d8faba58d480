//! Per-feature attribution of a risk score.
//!
//! Two methods sit behind the [`Attributor`] trait: exact path-dependent TreeSHAP
//! on the fitted trees and a LIME-style local surrogate fitted on perturbed
//! samples. [`ExplanationService`] runs both and tolerates either one failing.
use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::TrainedModel;
use crate::schema::{FeatureRecord, FEATURE_COUNT};

pub mod lime;
pub mod service;
pub mod tree_shap;

pub use lime::LimeAttributor;
pub use service::ExplanationService;
pub use tree_shap::TreeShapAttributor;

/// Contribution of one feature to one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttribution {
    pub name: String,
    /// Signed contribution; positive values push towards dropout.
    pub attribution: f64,
    /// The feature's value in the explained record.
    pub raw_value: f64,
    /// Human readable bin, e.g. `age_at_enrollment > 24.00`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Ranked attributions produced by one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodAttributions {
    pub method: String,
    pub attributions: Vec<FeatureAttribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub methods: Vec<MethodAttributions>,
}

impl Explanation {
    pub fn method(&self, name: &str) -> Option<&[FeatureAttribution]> {
        self.methods
            .iter()
            .find(|m| m.method == name)
            .map(|m| m.attributions.as_slice())
    }

    /// Attributions of the first method that produced any.
    pub fn primary(&self) -> Option<&MethodAttributions> {
        self.methods.iter().find(|m| !m.attributions.is_empty())
    }
}

/// Recoverable explanation failures. They never fail a prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum ExplainError {
    UnsupportedModel(String),
    MissingBackground,
    Numerical(String),
}

impl fmt::Display for ExplainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExplainError::UnsupportedModel(kind) => {
                write!(f, "Model '{}' is not supported by this explainer", kind)
            }
            ExplainError::MissingBackground => write!(f, "No background sample available"),
            ExplainError::Numerical(msg) => write!(f, "Numerical failure: {}", msg),
        }
    }
}

impl Error for ExplainError {}

pub trait Attributor: Send + Sync {
    fn name(&self) -> &str;

    /// Attributions for every schema feature, in schema order.
    fn attribute(
        &self,
        record: &FeatureRecord,
        model: &TrainedModel,
        background: &[[f64; FEATURE_COUNT]],
    ) -> Result<Vec<FeatureAttribution>, ExplainError>;
}

/// `curricular_units_1st_sem_grade` -> `Curricular Units 1st Sem Grade`.
pub fn display_name(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
