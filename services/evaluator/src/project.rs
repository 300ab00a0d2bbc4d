//! Loading of project declarations and data files.

use retrieval::InMemorySource;
use std::path::Path;
use tracing::info;
use verify_common::EvaluationDeclaration;

use crate::error::{EvaluatorError, Result};

/// Parse and validate a YAML project declaration.
pub fn parse_declaration(yaml: &str) -> Result<EvaluationDeclaration> {
    let declaration: EvaluationDeclaration = serde_yaml::from_str(yaml)?;
    declaration.validate().map_err(EvaluatorError::InvalidProject)?;
    Ok(declaration)
}

pub fn load_declaration(path: &Path) -> Result<EvaluationDeclaration> {
    let content = std::fs::read_to_string(path).map_err(|e| EvaluatorError::io(path, e))?;
    let declaration = parse_declaration(&content)?;

    info!(
        project_id = declaration.project_id,
        features = declaration.features.len(),
        metrics = declaration.metrics.len(),
        path = %path.display(),
        "Loaded project declaration"
    );
    Ok(declaration)
}

/// Load the raw time series and unit conversions of a JSON data file.
pub fn load_source(path: &Path) -> Result<InMemorySource> {
    let content = std::fs::read_to_string(path).map_err(|e| EvaluatorError::io(path, e))?;
    Ok(InMemorySource::from_json(&content)?)
}
