//! Error types for statistics processing.

use thiserror::Error;
use verify_common::{CommonError, Feature, MetricConstant};

/// A declaration that cannot be evaluated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("cannot compute {metric} without at least one value or probability threshold")]
    MissingThresholds { metric: MetricConstant },

    #[error("invalid declaration: {0}")]
    Invalid(String),
}

/// A threshold that cannot be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThresholdError {
    #[error("no climatology is available to resolve probability thresholds for feature {feature}")]
    MissingClimatology { feature: Feature },

    #[error("no thresholds are defined for feature {feature}")]
    MissingThresholds { feature: Feature },
}

/// Errors raised while computing statistics for a pool.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatisticsError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error("failed to compute {metric}: {reason}")]
    MetricCalculation {
        metric: MetricConstant,
        reason: String,
    },

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("the computation was cancelled before it produced a result")]
    Cancelled,
}

impl StatisticsError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn metric_calculation(metric: MetricConstant, reason: impl Into<String>) -> Self {
        Self::MetricCalculation {
            metric,
            reason: reason.into(),
        }
    }
}

impl From<CommonError> for DeclarationError {
    fn from(err: CommonError) -> Self {
        Self::Invalid(err.to_string())
    }
}

impl From<CommonError> for StatisticsError {
    fn from(err: CommonError) -> Self {
        Self::Declaration(err.into())
    }
}

pub type Result<T> = std::result::Result<T, StatisticsError>;
