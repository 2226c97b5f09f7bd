// src/config/mod.rs

//! Workflow configuration.
//!
//! - `model.rs`: the TOML-backed raw model and the validated types.
//! - `loader.rs`: reading a workflow file from disk.
//! - `validate.rs`: `TryFrom<RawWorkflowConfig> for WorkflowConfig`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_and_validate};
pub use model::{
    AppConfig, AppDefinition, HeartbeatPolicy, RawWorkflowConfig, WorkflowConfig,
    WorkflowSection, WorkflowSettings,
};
