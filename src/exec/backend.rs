// src/exec/backend.rs

//! Pluggable process spawner.
//!
//! The supervisor asks a `ProcessSpawner` to start each application instead
//! of calling `std::process::Command` directly, so tests can run
//! "applications" as in-process threads while production launches real
//! parallel jobs through [`OsSpawner`].

use std::process::{Command, Stdio};

use tracing::info;

use crate::config::AppDefinition;
use crate::errors::{Result, SteerError};
use crate::exec::invocation::Invocation;
use crate::exec::process::{ManagedProcess, OsProcess};

pub trait ProcessSpawner: Send + Sync {
    /// Start `app` as described by `invocation`.
    ///
    /// Failures are reported as [`SteerError::Launch`].
    fn spawn(&self, app: &AppDefinition, invocation: &Invocation)
        -> Result<Box<dyn ManagedProcess>>;
}

/// Spawns real OS processes. The application's stdout/stderr are inherited.
#[derive(Debug, Clone, Default)]
pub struct OsSpawner;

impl ProcessSpawner for OsSpawner {
    fn spawn(
        &self,
        app: &AppDefinition,
        invocation: &Invocation,
    ) -> Result<Box<dyn ManagedProcess>> {
        info!(
            app = %app.name,
            cmd = %invocation.command_line(),
            cwd = ?invocation.working_dir,
            "launching application"
        );

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| SteerError::launch(&app.name, e))?;

        Ok(Box::new(OsProcess::new(app.name.clone(), child)))
    }
}
