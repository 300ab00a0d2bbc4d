//! Error types for the shared verification data model.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised while constructing data model values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommonError {
    // === Time Errors ===
    #[error("Invalid time window: {0}")]
    InvalidTimeWindow(String),

    #[error("Invalid time scale: {0}")]
    InvalidTimeScale(String),

    // === Series Errors ===
    #[error("Duplicate event at valid time {valid_time} in time series '{series}'")]
    DuplicateEvent { series: String, valid_time: String },

    #[error("Invalid time series: {0}")]
    InvalidTimeSeries(String),

    // === Threshold Errors ===
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    // === Pool Errors ===
    #[error("Invalid pool: {0}")]
    InvalidPool(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    // === Declaration Errors ===
    #[error("Unrecognized {kind} '{value}'")]
    Unrecognized { kind: &'static str, value: String },
}

impl CommonError {
    /// Create an InvalidTimeWindow error.
    pub fn invalid_time_window(msg: impl Into<String>) -> Self {
        Self::InvalidTimeWindow(msg.into())
    }

    /// Create an InvalidThreshold error.
    pub fn invalid_threshold(msg: impl Into<String>) -> Self {
        Self::InvalidThreshold(msg.into())
    }

    /// Create an InvalidPool error.
    pub fn invalid_pool(msg: impl Into<String>) -> Self {
        Self::InvalidPool(msg.into())
    }

    /// Create an Unrecognized error for a named kind of value.
    pub fn unrecognized(kind: &'static str, value: impl Into<String>) -> Self {
        Self::Unrecognized {
            kind,
            value: value.into(),
        }
    }
}
