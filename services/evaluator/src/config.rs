//! Evaluator configuration.

use serde::{Deserialize, Serialize};
use statistics::ExecutorConfig;
use std::env;
use std::path::PathBuf;

use crate::error::{EvaluatorError, Result};

/// Format of log lines written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected text or json")),
        }
    }
}

/// Top-level evaluator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// YAML project declaration
    pub project_path: Option<PathBuf>,

    /// JSON data file holding the raw time series
    pub data_path: Option<PathBuf>,

    pub log_level: String,

    pub log_format: LogFormat,

    /// Worker pool sizes for statistics processing
    pub executor: ExecutorConfig,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            project_path: None,
            data_path: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            executor: ExecutorConfig::default(),
        }
    }
}

impl EvaluatorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            project_path: env::var("PROJECT_PATH").ok().map(PathBuf::from),
            data_path: env::var("DATA_PATH").ok().map(PathBuf::from),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: env::var("LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.log_format),
            executor: ExecutorConfig::from_env(),
        }
    }

    /// The project declaration path, once validated.
    pub fn project_path(&self) -> Result<&PathBuf> {
        self.project_path
            .as_ref()
            .ok_or_else(|| EvaluatorError::Config("no project declaration given".to_string()))
    }

    /// The data file path, once validated.
    pub fn data_path(&self) -> Result<&PathBuf> {
        self.data_path
            .as_ref()
            .ok_or_else(|| EvaluatorError::Config("no data file given".to_string()))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.project_path()?;
        self.data_path()?;
        self.executor.validate().map_err(EvaluatorError::Config)
    }
}
