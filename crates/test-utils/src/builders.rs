#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use steerflow::config::{AppConfig, AppDefinition, RawWorkflowConfig, WorkflowConfig, WorkflowSection};
use steerflow::errors::Result;
use steerflow::types::{BridgeRole, LauncherKind};

/// Builder for `WorkflowConfig` to simplify test setup.
///
/// Defaults differ from a production file: OS-assigned ports, the `direct`
/// launcher and a short grace period.
pub struct WorkflowBuilder {
    raw: RawWorkflowConfig,
}

impl WorkflowBuilder {
    pub fn new(conn_dir: impl AsRef<Path>) -> Self {
        Self {
            raw: RawWorkflowConfig {
                workflow: WorkflowSection {
                    conn_dir: conn_dir.as_ref().to_path_buf(),
                    base_port: 0,
                    grace_period_secs: 0.2,
                    launcher: LauncherKind::Direct,
                    ..WorkflowSection::default()
                },
                app: BTreeMap::new(),
            },
        }
    }

    pub fn with_app(mut self, name: &str, app: AppConfig) -> Self {
        self.raw.app.insert(name.to_string(), app);
        self
    }

    pub fn grace_period_secs(mut self, secs: f64) -> Self {
        self.raw.workflow.grace_period_secs = secs;
        self
    }

    pub fn base_port(mut self, port: u16) -> Self {
        self.raw.workflow.base_port = port;
        self
    }

    pub fn launcher(mut self, launcher: LauncherKind) -> Self {
        self.raw.workflow.launcher = launcher;
        self
    }

    pub fn raw(self) -> RawWorkflowConfig {
        self.raw
    }

    pub fn try_build(self) -> Result<WorkflowConfig> {
        WorkflowConfig::try_from(self.raw)
    }

    pub fn build(self) -> WorkflowConfig {
        self.try_build()
            .expect("Failed to build valid workflow from builder")
    }
}

/// Builder for `AppConfig`.
pub struct AppBuilder {
    app: AppConfig,
}

impl AppBuilder {
    pub fn new(exe: &str) -> Self {
        Self {
            app: AppConfig {
                exe: exe.to_string(),
                args: vec![],
                role: None,
                nprocs: 1,
                ppn: None,
                num_nodes: 1,
                cpus_per_task: 1,
                gpus_per_task: None,
                tau_profiling: false,
                working_dir: None,
                heartbeat: false,
                heart_rate: None,
                launch_on: None,
            },
        }
    }

    pub fn listener() -> Self {
        Self::new("in-process").role(BridgeRole::Listener)
    }

    pub fn sender() -> Self {
        Self::new("in-process").role(BridgeRole::Sender)
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.app.args.push(arg.to_string());
        self
    }

    pub fn role(mut self, role: BridgeRole) -> Self {
        self.app.role = Some(role);
        self
    }

    pub fn nprocs(mut self, n: u32) -> Self {
        self.app.nprocs = n;
        self
    }

    pub fn ppn(mut self, n: u32) -> Self {
        self.app.ppn = Some(n);
        self
    }

    pub fn num_nodes(mut self, n: u32) -> Self {
        self.app.num_nodes = n;
        self
    }

    pub fn cpus_per_task(mut self, n: u32) -> Self {
        self.app.cpus_per_task = n;
        self
    }

    pub fn gpus_per_task(mut self, n: u32) -> Self {
        self.app.gpus_per_task = Some(n);
        self
    }

    pub fn tau_profiling(mut self, on: bool) -> Self {
        self.app.tau_profiling = on;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.app.working_dir = Some(dir.into());
        self
    }

    pub fn heartbeat(mut self, heart_rate_secs: f64) -> Self {
        self.app.heartbeat = true;
        self.app.heart_rate = Some(heart_rate_secs);
        self
    }

    pub fn launch_on(mut self, symbol: &str) -> Self {
        self.app.launch_on = Some(symbol.to_string());
        self
    }

    pub fn build(self) -> AppConfig {
        self.app
    }

    /// Validated definition of this app under `name`, as the supervisor
    /// would see it.
    pub fn definition(self, name: &str) -> AppDefinition {
        let mut raw = RawWorkflowConfig::default();
        raw.app.insert(name.to_string(), self.app);
        if raw.app.values().all(|a| a.launch_on.is_some()) {
            raw.app
                .insert("_anchor".to_string(), AppBuilder::new("true").build());
        }
        let cfg = WorkflowConfig::try_from(raw).expect("invalid app definition");
        cfg.app(name).cloned().expect("app missing from workflow")
    }
}
