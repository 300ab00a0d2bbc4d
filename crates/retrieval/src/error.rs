//! Error types for retrieval.

use thiserror::Error;
use verify_common::CommonError;

/// Errors that can occur while reading time series or unit conversions.
#[derive(Error, Debug)]
pub enum RetrieverError {
    /// The backing store could not be read, or returned malformed data.
    #[error("data access failed: {0}")]
    DataAccess(String),

    /// The retriever does not offer this kind of access.
    #[error("{operation} is not supported by the {retriever}")]
    Unsupported {
        operation: &'static str,
        retriever: &'static str,
    },

    /// No conversion exists from the source unit to the desired unit.
    #[error("no conversion from measurement unit '{unit}' to '{desired}'")]
    NoSuchUnitConversion { unit: String, desired: String },

    /// A retrieved series violated a data model invariant.
    #[error("invalid time series: {0}")]
    InvalidSeries(#[from] CommonError),
}

impl RetrieverError {
    /// Create a DataAccess error.
    pub fn data_access(msg: impl Into<String>) -> Self {
        Self::DataAccess(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(operation: &'static str, retriever: &'static str) -> Self {
        Self::Unsupported {
            operation,
            retriever,
        }
    }

    /// Create a NoSuchUnitConversion error.
    pub fn no_such_unit_conversion(unit: impl Into<String>, desired: impl Into<String>) -> Self {
        Self::NoSuchUnitConversion {
            unit: unit.into(),
            desired: desired.into(),
        }
    }
}

impl From<serde_json::Error> for RetrieverError {
    fn from(err: serde_json::Error) -> Self {
        Self::DataAccess(err.to_string())
    }
}

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrieverError>;
