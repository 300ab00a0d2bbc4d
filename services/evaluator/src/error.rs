//! Evaluator error types.

use pool_processor::PoolCreationError;
use retrieval::RetrieverError;
use statistics::{DeclarationError, StatisticsError};
use std::path::PathBuf;
use thiserror::Error;
use verify_common::CommonError;

/// Errors raised while loading or running an evaluation.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse project declaration: {0}")]
    ProjectParse(#[from] serde_yaml::Error),

    #[error("Invalid project declaration: {0}")]
    InvalidProject(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Retrieval(#[from] RetrieverError),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    PoolCreation(#[from] PoolCreationError),

    #[error(transparent)]
    Statistics(#[from] StatisticsError),

    #[error("Evaluation task failed: {0}")]
    Task(String),
}

impl EvaluatorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for EvaluatorError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type for evaluator operations.
pub type Result<T> = std::result::Result<T, EvaluatorError>;
