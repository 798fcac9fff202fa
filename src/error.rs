//! Error types for the RiskAlgo service

use thiserror::Error;

/// Failures of a single calculation. Raised before any arithmetic runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalculationError {
    #[error("Invalid input `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Configuration error `{field}`: {reason}")]
    Configuration { field: String, reason: String },
}

impl CalculationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CalculationError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CalculationError::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Name of the offending field
    pub fn field(&self) -> &str {
        match self {
            CalculationError::InvalidInput { field, .. } => field,
            CalculationError::Configuration { field, .. } => field,
        }
    }
}

#[derive(Error, Debug)]
pub enum RiskAlgoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error("Config error on line {line}: {message}")]
    Config { line: usize, message: String },

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Request failed with status {status}: {body}")]
    Request { status: u16, body: String },
}
