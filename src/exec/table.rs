// src/exec/table.rs

//! The set of running applications and workflow-wide termination.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::AppDefinition;
use crate::exec::process::{ExitState, ManagedProcess};
use crate::wire::ShutdownFlag;

/// Grace period between the terminate request and the forced kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// One launched application: its process plus the control-plane threads
/// serving it.
pub struct RunningApp {
    pub def: AppDefinition,
    process: Box<dyn ManagedProcess>,
    shutdown: ShutdownFlag,
    threads: Vec<JoinHandle<()>>,
    exit: Option<ExitState>,
}

impl std::fmt::Debug for RunningApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningApp")
            .field("name", &self.def.name)
            .field("pid", &self.process.pid())
            .field("threads", &self.threads.len())
            .field("exit", &self.exit)
            .finish()
    }
}

impl RunningApp {
    pub fn new(
        def: AppDefinition,
        process: Box<dyn ManagedProcess>,
        shutdown: ShutdownFlag,
        threads: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            def,
            process,
            shutdown,
            threads,
            exit: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Tear down an application that never made it into the table.
    pub fn discard(mut self) {
        self.shutdown.trigger();
        if let Err(e) = self.process.force_kill() {
            warn!(app = %self.def.name, error = %e, "failed to kill discarded application");
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }

    /// Poll the process once and remember its exit.
    fn refresh_exit(&mut self) -> Option<ExitState> {
        if self.exit.is_none() {
            match self.process.try_exit() {
                Ok(Some(state)) => {
                    info!(app = %self.def.name, ?state, "application process exited");
                    self.exit = Some(state);
                }
                Ok(None) => {}
                Err(e) => warn!(app = %self.def.name, error = %e, "failed to poll process"),
            }
        }
        self.exit
    }
}

/// Summary of one `terminate_workflow` escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminationReport {
    /// Sent a graceful terminate request.
    pub signalled: Vec<String>,
    /// Still alive after the grace period and killed.
    pub killed: Vec<String>,
    /// Had already exited before escalation began.
    pub already_exited: Vec<String>,
}

#[derive(Debug, Default)]
struct TableInner {
    apps: Vec<RunningApp>,
    closed: bool,
    report: Option<TerminationReport>,
}

/// Shared, exclusively-owning registry of running applications.
///
/// Cloning gives another handle onto the same table.
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    inner: Arc<Mutex<TableInner>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether termination has begun; no more applications are accepted.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Register a launched application. Refused (and handed back) once the
    /// workflow is closed.
    pub fn insert(&self, app: RunningApp) -> Result<(), RunningApp> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(app);
        }
        inner.apps.push(app);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().apps.iter().map(|a| a.def.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().apps.is_empty()
    }

    /// Names of applications whose process has exited, polling each once.
    pub fn exited(&self) -> Vec<String> {
        let mut inner = self.lock();
        inner
            .apps
            .iter_mut()
            .filter_map(|a| a.refresh_exit().map(|_| a.def.name.clone()))
            .collect()
    }

    pub fn all_exited(&self) -> bool {
        let mut inner = self.lock();
        inner.apps.iter_mut().all(|a| a.refresh_exit().is_some())
    }

    pub fn exit_state(&self, app: &str) -> Option<ExitState> {
        self.lock()
            .apps
            .iter()
            .find(|a| a.def.name == app)
            .and_then(|a| a.exit)
    }

    /// Make pending accepts for `app` give up.
    pub fn abandon(&self, app: &str) {
        if let Some(a) = self.lock().apps.iter().find(|a| a.def.name == app) {
            a.shutdown.trigger();
        }
    }

    /// Take every control-plane thread handle out of the table for joining.
    pub fn take_threads(&self) -> Vec<(String, JoinHandle<()>)> {
        let mut inner = self.lock();
        let mut handles = Vec::new();
        for app in inner.apps.iter_mut() {
            for handle in app.threads.drain(..) {
                handles.push((app.def.name.clone(), handle));
            }
        }
        handles
    }

    /// Graceful-then-forced termination of every application.
    ///
    /// Sends a terminate request to each live process, waits `grace`, then
    /// kills only those still alive. The table is closed for the rest of its
    /// life. Calling this again returns the first report without acting.
    pub fn terminate_workflow(&self, grace: Duration) -> TerminationReport {
        let mut report = TerminationReport::default();

        {
            let mut inner = self.lock();
            if inner.closed {
                debug!("workflow already terminating; nothing to do");
                return inner.report.clone().unwrap_or_default();
            }
            inner.closed = true;

            for app in inner.apps.iter_mut() {
                app.shutdown.trigger();
                let name = app.def.name.clone();
                if app.refresh_exit().is_some() {
                    report.already_exited.push(name);
                    continue;
                }
                match app.process.request_terminate() {
                    Ok(()) => {
                        info!(app = %name, "requested termination");
                        report.signalled.push(name);
                    }
                    Err(e) => warn!(app = %name, error = %e, "terminate request failed"),
                }
            }
        }

        // Unlocked so the supervisor can keep polling exits meanwhile.
        debug!(grace = ?grace, "waiting for applications to exit");
        thread::sleep(grace);

        let mut inner = self.lock();
        for app in inner.apps.iter_mut() {
            if app.refresh_exit().is_some() {
                continue;
            }
            let name = app.def.name.clone();
            match app.process.force_kill() {
                Ok(()) => {
                    warn!(app = %name, "application did not exit in time; killed");
                    app.exit = Some(ExitState::Killed);
                    report.killed.push(name);
                }
                Err(e) => warn!(app = %name, error = %e, "force kill failed"),
            }
        }
        inner.report = Some(report.clone());
        report
    }
}
