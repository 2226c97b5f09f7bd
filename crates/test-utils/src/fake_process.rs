#![allow(dead_code)]

//! In-process stand-ins for launched applications.
//!
//! - [`FakeProcess`] is a scripted `ManagedProcess` for escalation tests.
//! - [`ThreadSpawner`] is a `ProcessSpawner` that runs each "application"
//!   as a closure on its own thread, handing it the identity environment a
//!   real process would receive.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use steerflow::api::AppIdentity;
use steerflow::config::AppDefinition;
use steerflow::errors::{Result, SteerError};
use steerflow::exec::{ExitState, Invocation, ManagedProcess, ProcessSpawner};
use tracing::debug;

/// What the supervisor did to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessCall {
    Spawn,
    Terminate,
    Kill,
}

/// Shared, timestamped record of process calls across all fakes.
#[derive(Debug, Clone, Default)]
pub struct ProcessLog {
    calls: Arc<Mutex<Vec<(String, ProcessCall, Instant)>>>,
}

impl ProcessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, app: &str, call: ProcessCall) {
        self.calls
            .lock()
            .unwrap()
            .push((app.to_string(), call, Instant::now()));
    }

    pub fn calls(&self) -> Vec<(String, ProcessCall)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(app, call, _)| (app.clone(), *call))
            .collect()
    }

    pub fn count(&self, app: &str, call: ProcessCall) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, c, _)| a == app && *c == call)
            .count()
    }

    /// Time of the first `call` made on `app`.
    pub fn time_of(&self, app: &str, call: ProcessCall) -> Option<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(a, c, _)| a == app && *c == call)
            .map(|(_, _, at)| *at)
    }
}

/// How a [`FakeProcess`] reacts to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Exits as soon as it is asked to terminate.
    ExitsOnTerminate,
    /// Ignores the terminate request; only a kill stops it.
    IgnoresTerminate,
    /// Had already exited with this code before anything happened.
    AlreadyExited(i32),
}

#[derive(Debug)]
pub struct FakeProcess {
    app: String,
    script: Script,
    exit: Option<ExitState>,
    log: ProcessLog,
}

impl FakeProcess {
    pub fn new(app: &str, script: Script, log: &ProcessLog) -> Self {
        let exit = match script {
            Script::AlreadyExited(code) => Some(ExitState::Exited(Some(code))),
            _ => None,
        };
        Self {
            app: app.to_string(),
            script,
            exit,
            log: log.clone(),
        }
    }
}

impl ManagedProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn request_terminate(&mut self) -> io::Result<()> {
        self.log.record(&self.app, ProcessCall::Terminate);
        if self.script == Script::ExitsOnTerminate && self.exit.is_none() {
            self.exit = Some(ExitState::Exited(None));
        }
        Ok(())
    }

    fn try_exit(&mut self) -> io::Result<Option<ExitState>> {
        Ok(self.exit)
    }

    fn force_kill(&mut self) -> io::Result<()> {
        self.log.record(&self.app, ProcessCall::Kill);
        if self.exit.is_none() {
            self.exit = Some(ExitState::Killed);
        }
        Ok(())
    }

    fn wait(&mut self) -> io::Result<ExitState> {
        self.exit
            .ok_or_else(|| io::Error::other("fake process would block forever"))
    }
}

/// Set when the supervisor asks an in-process application to stop.
#[derive(Debug, Clone, Default)]
pub struct TerminationToken(Arc<AtomicBool>);

impl TerminationToken {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What an in-process application receives instead of a real environment.
#[derive(Debug, Clone)]
pub struct AppHarness {
    pub name: String,
    pub env: Vec<(String, String)>,
    pub terminate: TerminationToken,
}

impl AppHarness {
    pub fn identity(&self) -> Result<AppIdentity> {
        AppIdentity::from_vars(self.env.clone())
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate.is_triggered()
    }
}

pub type AppMain = Arc<dyn Fn(AppHarness) -> i32 + Send + Sync>;

/// Spawns registered closures instead of processes.
///
/// An application without a registered closure fails to launch.
#[derive(Clone, Default)]
pub struct ThreadSpawner {
    apps: HashMap<String, AppMain>,
    log: ProcessLog,
}

impl std::fmt::Debug for ThreadSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.apps.keys().collect();
        names.sort();
        f.debug_struct("ThreadSpawner")
            .field("apps", &names)
            .finish_non_exhaustive()
    }
}

impl ThreadSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(
        mut self,
        name: &str,
        main: impl Fn(AppHarness) -> i32 + Send + Sync + 'static,
    ) -> Self {
        self.apps.insert(name.to_string(), Arc::new(main));
        self
    }

    pub fn log(&self) -> ProcessLog {
        self.log.clone()
    }
}

impl ProcessSpawner for ThreadSpawner {
    fn spawn(
        &self,
        app: &AppDefinition,
        invocation: &Invocation,
    ) -> Result<Box<dyn ManagedProcess>> {
        let main = self
            .apps
            .get(&app.name)
            .cloned()
            .ok_or_else(|| SteerError::launch(&app.name, "no in-process main registered"))?;

        let harness = AppHarness {
            name: app.name.clone(),
            env: invocation.env.clone(),
            terminate: TerminationToken::default(),
        };
        let terminate = harness.terminate.clone();

        let handle = thread::Builder::new()
            .name(format!("app-{}", app.name))
            .spawn(move || main(harness))
            .map_err(|e| SteerError::launch(&app.name, e))?;

        self.log.record(&app.name, ProcessCall::Spawn);
        debug!(app = %app.name, "in-process application started");

        Ok(Box::new(ThreadProcess {
            app: app.name.clone(),
            handle: Some(handle),
            terminate,
            exit: None,
            log: self.log.clone(),
        }))
    }
}

/// Handle onto an application thread started by [`ThreadSpawner`].
#[derive(Debug)]
pub struct ThreadProcess {
    app: String,
    handle: Option<JoinHandle<i32>>,
    terminate: TerminationToken,
    exit: Option<ExitState>,
    log: ProcessLog,
}

impl ThreadProcess {
    fn reap(&mut self) -> ExitState {
        let state = match self.handle.take().map(JoinHandle::join) {
            Some(Ok(code)) => ExitState::Exited(Some(code)),
            Some(Err(_)) => ExitState::Exited(None),
            None => ExitState::Killed,
        };
        self.exit = Some(state);
        state
    }
}

impl ManagedProcess for ThreadProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn request_terminate(&mut self) -> io::Result<()> {
        self.log.record(&self.app, ProcessCall::Terminate);
        self.terminate.trigger();
        Ok(())
    }

    fn try_exit(&mut self) -> io::Result<Option<ExitState>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        match &self.handle {
            Some(handle) if handle.is_finished() => Ok(Some(self.reap())),
            _ => Ok(None),
        }
    }

    fn force_kill(&mut self) -> io::Result<()> {
        self.log.record(&self.app, ProcessCall::Kill);
        self.terminate.trigger();
        // A thread cannot be killed; give it a moment, then let it go.
        let deadline = Instant::now() + Duration::from_millis(500);
        while self.handle.as_ref().is_some_and(|h| !h.is_finished()) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if self.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            self.handle = None;
        }
        self.exit = Some(ExitState::Killed);
        Ok(())
    }

    fn wait(&mut self) -> io::Result<ExitState> {
        match self.exit {
            Some(state) => Ok(state),
            None => Ok(self.reap()),
        }
    }
}
