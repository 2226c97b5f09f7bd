// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawWorkflowConfig, WorkflowConfig};
use crate::errors::Result;

/// Read a workflow file into its raw form. TOML deserialization only; no
/// semantic checks. Use [`load_and_validate`] for those.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: RawWorkflowConfig = toml::from_str(&contents)?;
    debug!(path = %path.display(), apps = config.app.len(), "workflow file parsed");
    Ok(config)
}

/// Parse a workflow from an in-memory TOML string and validate it.
pub fn parse_and_validate(contents: &str) -> Result<WorkflowConfig> {
    let raw: RawWorkflowConfig = toml::from_str(contents)?;
    WorkflowConfig::try_from(raw)
}

/// Read and validate a workflow file.
///
/// Rejects, among others: no applications, invalid names, zero process
/// counts, heartbeats without a role or `heart_rate`, and `launch_on`
/// symbols that collide with built-in signals or with each other.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowConfig> {
    let raw = load_from_path(&path)?;
    WorkflowConfig::try_from(raw)
}

/// `Workflow.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Workflow.toml")
}
