//! Forecast verification evaluator.
//!
//! Reads a YAML project declaration and a JSON data file, assembles a pool of
//! pairs for every feature and time window, computes the declared metrics
//! for each pool and reports the statistics as one JSON document.

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod project;

pub use config::{EvaluatorConfig, LogFormat};
pub use error::{EvaluatorError, Result};
pub use output::{EvaluationOutput, PoolStatistics};
pub use pipeline::{run_project, Evaluator};
