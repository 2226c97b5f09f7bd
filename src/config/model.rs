// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::signal::Signal;
use crate::types::{BridgeRole, LauncherKind};

/// Workflow file as read from TOML, before validation.
///
/// ```toml
/// [workflow]
/// conn_dir = "run"
/// base_port = 6000
/// launcher = "srun"
///
/// [app.simulation]
/// exe = "./sim"
/// role = "listener"
/// nprocs = 32
/// heartbeat = true
/// heart_rate = 2.0
///
/// [app.analysis]
/// exe = "./analysis"
/// role = "sender"
/// ```
///
/// Turned into a [`WorkflowConfig`] through `TryFrom` (see `validate.rs`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWorkflowConfig {
    #[serde(default)]
    pub workflow: WorkflowSection,

    /// Keys are application names.
    #[serde(default)]
    pub app: BTreeMap<String, AppConfig>,
}

/// `[workflow]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    /// Where `<app>.conn_info` files are written.
    #[serde(default = "default_conn_dir")]
    pub conn_dir: PathBuf,

    /// Address the control plane binds and publishes.
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// First port of the (signal, heartbeat) pair sequence. `0` asks the OS
    /// for free ports instead.
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: f64,

    #[serde(default)]
    pub launcher: LauncherKind,
}

fn default_conn_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_base_port() -> u16 {
    6000
}

fn default_grace_period_secs() -> f64 {
    5.0
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            conn_dir: default_conn_dir(),
            bind_host: default_bind_host(),
            base_port: default_base_port(),
            grace_period_secs: default_grace_period_secs(),
            launcher: LauncherKind::default(),
        }
    }
}

/// `[app.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub exe: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Bridge role seen from the control plane. Absent: supervised only,
    /// no control connection.
    #[serde(default)]
    pub role: Option<BridgeRole>,

    #[serde(default = "default_one")]
    pub nprocs: u32,

    /// Processes per node; defaults to `nprocs` spread over `num_nodes`.
    #[serde(default)]
    pub ppn: Option<u32>,

    #[serde(default = "default_one")]
    pub num_nodes: u32,

    #[serde(default = "default_one")]
    pub cpus_per_task: u32,

    #[serde(default)]
    pub gpus_per_task: Option<u32>,

    #[serde(default)]
    pub tau_profiling: bool,

    /// Defaults to the directory the control plane runs in.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub heartbeat: bool,

    /// Seconds; required when `heartbeat = true`.
    #[serde(default)]
    pub heart_rate: Option<f64>,

    /// Extension symbol that launches this app on demand.
    #[serde(default)]
    pub launch_on: Option<String>,
}

fn default_one() -> u32 {
    1
}

/// Validated `[workflow]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    pub conn_dir: PathBuf,
    pub bind_host: String,
    pub base_port: u16,
    pub grace_period: Duration,
    pub launcher: LauncherKind,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        let raw = WorkflowSection::default();
        Self {
            conn_dir: raw.conn_dir,
            bind_host: raw.bind_host,
            base_port: raw.base_port,
            grace_period: Duration::from_secs_f64(raw.grace_period_secs),
            launcher: raw.launcher,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartbeatPolicy {
    pub enabled: bool,
    pub heart_rate: Duration,
}

impl HeartbeatPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn every(heart_rate: Duration) -> Self {
        Self {
            enabled: true,
            heart_rate,
        }
    }
}

/// One application of the workflow, immutable after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AppDefinition {
    pub name: String,
    pub exe: String,
    pub args: Vec<String>,
    pub role: Option<BridgeRole>,
    pub nprocs: u32,
    pub ppn: u32,
    pub num_nodes: u32,
    pub cpus_per_task: u32,
    pub gpus_per_task: Option<u32>,
    pub tau_profiling: bool,
    pub working_dir: PathBuf,
    pub heartbeat: HeartbeatPolicy,
    pub launch_on: Option<Signal>,
}

impl AppDefinition {
    /// Launched when the workflow starts (as opposed to on demand).
    pub fn is_startup(&self) -> bool {
        self.launch_on.is_none()
    }
}

/// A validated workflow: settings plus applications in name order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    settings: WorkflowSettings,
    apps: Vec<AppDefinition>,
}

impl WorkflowConfig {
    /// Build without validation. Used by `TryFrom<RawWorkflowConfig>` once
    /// checks have passed.
    pub(crate) fn new_unchecked(settings: WorkflowSettings, apps: Vec<AppDefinition>) -> Self {
        Self { settings, apps }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn apps(&self) -> &[AppDefinition] {
        &self.apps
    }

    pub fn app(&self, name: &str) -> Option<&AppDefinition> {
        self.apps.iter().find(|a| a.name == name)
    }

    pub fn startup_apps(&self) -> impl Iterator<Item = &AppDefinition> {
        self.apps.iter().filter(|a| a.is_startup())
    }

    pub fn on_demand_apps(&self) -> impl Iterator<Item = &AppDefinition> {
        self.apps.iter().filter(|a| !a.is_startup())
    }
}
