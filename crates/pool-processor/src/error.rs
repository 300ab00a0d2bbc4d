//! Error types for pool assembly.

use retrieval::RetrieverError;
use thiserror::Error;
use verify_common::{CommonError, Feature};

/// A change of time scale that cannot be performed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RescalingError {
    #[error("cannot downscale from {existing} to {desired}")]
    Downscaling { existing: String, desired: String },

    #[error("the desired time scale {desired} has an unknown function")]
    UnknownDesiredFunction { desired: String },

    #[error("cannot change the function from {existing} to {desired} without changing the period")]
    FunctionChangeWithoutPeriodChange { existing: String, desired: String },

    #[error("cannot accumulate instantaneous values into {desired}")]
    AccumulatingInstantaneous { desired: String },

    #[error("cannot accumulate values that are not accumulations: {existing} to {desired}")]
    AccumulatingNonAccumulation { existing: String, desired: String },

    #[error("the existing time scale is missing and the desired time scale {desired} is not instantaneous")]
    MissingExistingTimeScale { desired: String },

    #[error("{side} data requires rescaling to {desired} but no upscaler was supplied")]
    NoUpscaler { side: &'static str, desired: String },
}

/// Malformed input for exact-time pairing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    #[error("cannot pair series with different time scales: left {left}, right {right}")]
    MismatchedTimeScales { left: String, right: String },
}

/// The cause of a failed pool assembly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("data access error: {0}")]
    DataAccess(String),

    #[error("rescaling error: {0}")]
    Rescaling(#[from] RescalingError),

    #[error("pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("unit conversion error: {0}")]
    NoSuchUnitConversion(String),
}

impl PoolError {
    /// Create a DataAccess error.
    pub fn data_access(msg: impl Into<String>) -> Self {
        Self::DataAccess(msg.into())
    }
}

impl From<RetrieverError> for PoolError {
    fn from(err: RetrieverError) -> Self {
        match err {
            RetrieverError::NoSuchUnitConversion { .. } => Self::NoSuchUnitConversion(err.to_string()),
            other => Self::DataAccess(other.to_string()),
        }
    }
}

impl From<CommonError> for PoolError {
    fn from(err: CommonError) -> Self {
        Self::DataAccess(format!("invalid pool data: {err}"))
    }
}

/// A pool could not be created for a feature.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to create a pool for project {project_id} and feature {feature}: {source}")]
pub struct PoolCreationError {
    pub project_id: i64,
    pub feature: Feature,
    #[source]
    pub source: PoolError,
}

impl PoolCreationError {
    pub fn new(project_id: i64, feature: Feature, source: impl Into<PoolError>) -> Self {
        Self {
            project_id,
            feature,
            source: source.into(),
        }
    }
}

/// Result type for pool assembly steps.
pub type Result<T> = std::result::Result<T, PoolError>;
