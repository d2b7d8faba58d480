use std::error::Error;
use std::fmt;

/// Failures surfaced by the training and prediction pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskError {
    /// Source dataset missing, unreadable or malformed. Aborts training.
    DataUnavailable(String),
    /// Status value outside the known label set.
    UnknownLabel { row: usize, value: String },
    /// Model artifact missing or undecodable. No prediction is attempted.
    ModelUnavailable(String),
    /// Request does not match the feature schema. Only that request fails.
    SchemaMismatch(String),
    InvalidConfig(String),
    /// Writing an artifact or report failed; the previous file is untouched.
    Persist(String),
}

impl fmt::Display for RiskError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RiskError::DataUnavailable(msg) => write!(f, "Dataset unavailable: {}", msg),
            RiskError::UnknownLabel { row, value } => {
                write!(f, "Unknown target label '{}' at row {}", value, row)
            }
            RiskError::ModelUnavailable(msg) => write!(f, "Model unavailable: {}", msg),
            RiskError::SchemaMismatch(msg) => write!(f, "Feature schema mismatch: {}", msg),
            RiskError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            RiskError::Persist(msg) => write!(f, "Failed to persist: {}", msg),
        }
    }
}

impl Error for RiskError {}

pub type Result<T> = std::result::Result<T, RiskError>;
