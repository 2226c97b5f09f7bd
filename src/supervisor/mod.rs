// src/supervisor/mod.rs

//! Launching a workflow and seeing it through.
//!
//! The `Supervisor` owns the process table, the port allocator and every
//! queue the control plane is wired from. `run` launches the startup
//! applications, starts the signal router and the decision engine, then
//! reacts to [`WorkflowEvent`]s until every bridge has finished and every
//! process has exited, or until the engine reports termination.

pub mod ports;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::api::AppIdentity;
use crate::bridge::{ControlBridge, RelayEndpoint, Router};
use crate::config::{AppDefinition, WorkflowConfig, WorkflowSettings};
use crate::engine::{spawn_decision_engine, DecisionEvent, EngineOutcome, TerminationCause, WorkflowEvent};
use crate::errors::{Result, SteerError};
use crate::exec::{Invocation, OsSpawner, ProcessSpawner, ProcessTable, RunningApp};
use crate::heartbeat::HeartbeatMonitor;
use crate::queue::{queue, QueueReceiver, QueueSender, TryPop};
use crate::signal::Signal;
use crate::types::BridgeRole;
use crate::wire::{self, ShutdownFlag};

pub use ports::{PortAllocator, PortPair};

/// How often the run loop polls for events and process exits.
const EVENT_POLL: Duration = Duration::from_millis(50);

/// How a workflow run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Every bridge finished and every process exited on its own.
    Completed,
    /// The decision engine tore the workflow down.
    Terminated { cause: TerminationCause },
}

impl WorkflowOutcome {
    /// Exit status for the control-plane process.
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkflowOutcome::Completed => 0,
            WorkflowOutcome::Terminated { .. } => 1,
        }
    }
}

impl fmt::Display for WorkflowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowOutcome::Completed => f.write_str("completed"),
            WorkflowOutcome::Terminated { cause } => write!(f, "terminated ({cause})"),
        }
    }
}

pub struct Supervisor<S: ProcessSpawner = OsSpawner> {
    config: WorkflowConfig,
    conn_dir: PathBuf,
    spawner: S,
    ports: PortAllocator,
    table: ProcessTable,

    /// Producer side of the router inbox; dropped once startup apps are
    /// launched so the inbox closes with the last sender bridge.
    inbox_tx: Option<QueueSender<Signal>>,
    inbox_rx: Option<QueueReceiver<Signal>>,
    /// Queues feeding listener-role bridges, handed to the router.
    outlets: Vec<(String, QueueSender<Signal>)>,

    decisions_tx: QueueSender<DecisionEvent>,
    decisions_rx: Option<QueueReceiver<DecisionEvent>>,

    events_tx: QueueSender<WorkflowEvent>,
    events_rx: QueueReceiver<WorkflowEvent>,

    /// Apps whose control-plane bridge has not reported back yet.
    pending_bridges: HashSet<String>,
    routing_started: bool,
    router: Option<JoinHandle<()>>,
}

impl<S: ProcessSpawner> fmt::Debug for Supervisor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("conn_dir", &self.conn_dir)
            .field("ports", &self.ports)
            .field("table", &self.table)
            .field("pending_bridges", &self.pending_bridges)
            .finish_non_exhaustive()
    }
}

impl<S: ProcessSpawner> Supervisor<S> {
    /// Prepare a workflow. Creates the rendezvous directory if needed and
    /// makes it absolute, since applications may run elsewhere.
    pub fn new(config: WorkflowConfig, spawner: S) -> Result<Self> {
        let settings = config.settings();
        fs::create_dir_all(&settings.conn_dir)?;
        let conn_dir = if settings.conn_dir.is_absolute() {
            settings.conn_dir.clone()
        } else {
            std::env::current_dir()?.join(&settings.conn_dir)
        };
        let ports = PortAllocator::new(settings.bind_host.clone(), settings.base_port);

        let (inbox_tx, inbox_rx) = queue();
        let (decisions_tx, decisions_rx) = queue();
        let (events_tx, events_rx) = queue();

        Ok(Self {
            config,
            conn_dir,
            spawner,
            ports,
            table: ProcessTable::new(),
            inbox_tx: Some(inbox_tx),
            inbox_rx: Some(inbox_rx),
            outlets: Vec::new(),
            decisions_tx,
            decisions_rx: Some(decisions_rx),
            events_tx,
            events_rx,
            pending_bridges: HashSet::new(),
            routing_started: false,
            router: None,
        })
    }

    pub fn settings(&self) -> &WorkflowSettings {
        self.config.settings()
    }

    pub fn conn_dir(&self) -> &PathBuf {
        &self.conn_dir
    }

    /// Handle for feeding the decision engine from outside, e.g. to turn
    /// Ctrl-C into [`DecisionEvent::ShutdownRequested`].
    pub fn decision_sender(&self) -> QueueSender<DecisionEvent> {
        self.decisions_tx.clone()
    }

    pub fn process_table(&self) -> &ProcessTable {
        &self.table
    }

    /// Launch one application.
    ///
    /// For a bridged app this binds its port pair, publishes
    /// `<app>.conn_info`, starts the control-plane bridge (and heartbeat
    /// monitor) and only then spawns the process. If anything fails, the
    /// app's threads are stopped and its rendezvous file removed; other
    /// apps are unaffected.
    pub fn launch(&mut self, def: &AppDefinition) -> Result<()> {
        if self.table.is_closed() {
            return Err(SteerError::launch(&def.name, "workflow is terminating"));
        }
        if self.table.names().iter().any(|n| *n == def.name) {
            return Err(SteerError::launch(&def.name, "already running"));
        }

        let shutdown = ShutdownFlag::new();
        let mut threads = Vec::new();

        let spawned = self
            .start_control_threads(def, &shutdown, &mut threads)
            .and_then(|env| {
                let invocation = Invocation::build(def, self.settings().launcher).with_env(env);
                debug!(app = %def.name, cmd = %invocation.command_line(), "spawning");
                self.spawner.spawn(def, &invocation)
            });

        let process = match spawned {
            Ok(process) => process,
            Err(e) => {
                error!(app = %def.name, error = %e, "launch failed; cleaning up");
                self.abort_launch(def, &shutdown, threads);
                return Err(e);
            }
        };

        if let Err(app) = self
            .table
            .insert(RunningApp::new(def.clone(), process, shutdown, threads))
        {
            app.discard();
            wire::retract(&self.conn_dir, &def.name);
            return Err(SteerError::launch(&def.name, "workflow closed during launch"));
        }

        if def.role.is_some() {
            self.pending_bridges.insert(def.name.clone());
        }
        info!(app = %def.name, role = ?def.role, "application launched");
        Ok(())
    }

    /// Bridge and heartbeat threads for `def`; returns the identity
    /// variables the application needs to find them.
    fn start_control_threads(
        &mut self,
        def: &AppDefinition,
        shutdown: &ShutdownFlag,
        threads: &mut Vec<JoinHandle<()>>,
    ) -> Result<Vec<(String, String)>> {
        let Some(role) = def.role else {
            return Ok(Vec::new());
        };
        if self.routing_started {
            return Err(SteerError::launch(
                &def.name,
                "bridged applications must start with the workflow",
            ));
        }

        let pair = self.ports.allocate_pair()?;
        info!(app = %def.name, addr = %pair.addr, %role, "allocated control ports");
        wire::publish(&self.conn_dir, &def.name, &pair.addr)?;

        let endpoint = match role {
            BridgeRole::Listener => {
                let (tx, rx) = queue();
                self.outlets.push((def.name.clone(), tx));
                RelayEndpoint::Outbound(rx)
            }
            BridgeRole::Sender => {
                let tx = self
                    .inbox_tx
                    .as_ref()
                    .ok_or_else(|| SteerError::launch(&def.name, "signal inbox already closed"))?;
                RelayEndpoint::Inbound(tx.clone())
            }
        };

        let bridge = ControlBridge {
            app: def.name.clone(),
            role,
            listener: pair.signal,
            endpoint,
            conn_dir: self.conn_dir.clone(),
            shutdown: shutdown.clone(),
        };
        threads.push(bridge.spawn(self.events_tx.clone())?);

        if def.heartbeat.enabled {
            let monitor = HeartbeatMonitor {
                app: def.name.clone(),
                listener: pair.heartbeat,
                heart_rate: def.heartbeat.heart_rate,
                shutdown: shutdown.clone(),
            };
            threads.push(monitor.spawn(self.decisions_tx.clone())?);
        }

        let identity = AppIdentity::new(def.name.clone(), role)
            .with_conn_dir(self.conn_dir.clone())
            .with_heartbeat(def.heartbeat.enabled);
        Ok(identity.to_env())
    }

    fn abort_launch(&mut self, def: &AppDefinition, shutdown: &ShutdownFlag, threads: Vec<JoinHandle<()>>) {
        shutdown.trigger();
        for handle in threads {
            let _ = handle.join();
        }
        wire::retract(&self.conn_dir, &def.name);
        self.outlets.retain(|(app, _)| *app != def.name);
    }

    /// Run the workflow to completion or termination.
    pub fn run(mut self) -> Result<WorkflowOutcome> {
        let startup: Vec<AppDefinition> = self.config.startup_apps().cloned().collect();
        info!(apps = startup.len(), conn_dir = %self.conn_dir.display(), "starting workflow");

        for def in &startup {
            if let Err(e) = self.launch(def) {
                error!(app = %def.name, error = %e, "application not started");
            }
        }
        if self.table.is_empty() {
            return Err(SteerError::launch("workflow", "no application could be started"));
        }

        self.start_router()?;
        let decisions = self
            .decisions_rx
            .take()
            .ok_or_else(|| SteerError::Config("decision engine already started".to_string()))?;
        let engine = spawn_decision_engine(
            decisions,
            self.table.clone(),
            self.settings().grace_period,
            self.events_tx.clone(),
        )?;

        // The router finishing means every launch request it produced is
        // already queued.
        let mut cause = self.pump_until(|sup| sup.pending_bridges.is_empty() && sup.router_finished());
        if cause.is_none() {
            info!("all bridges finished; waiting for application processes");
            cause = self.pump_until(|sup| sup.table.all_exited());
        }

        if cause.is_none() {
            // The engine may have acted on a failure between our last poll
            // and this point; its outcome is authoritative.
            let _ = self.decisions_tx.push(DecisionEvent::Quit);
        }
        match engine.join() {
            Ok(EngineOutcome::Terminated { cause: c, .. }) => cause = Some(c),
            Ok(outcome) => debug!(?outcome, "decision engine finished"),
            Err(_) => error!("decision engine thread panicked"),
        }

        self.join_all();

        let outcome = match cause {
            Some(cause) => WorkflowOutcome::Terminated { cause },
            None => WorkflowOutcome::Completed,
        };
        info!(%outcome, "workflow finished");
        Ok(outcome)
    }

    fn start_router(&mut self) -> Result<()> {
        // Only bridges may feed the inbox from here on.
        self.inbox_tx = None;
        let inbox = self
            .inbox_rx
            .take()
            .ok_or_else(|| SteerError::Config("signal router already started".to_string()))?;

        let mut router = Router::new(inbox, self.events_tx.clone());
        for (app, tx) in self.outlets.drain(..) {
            router.add_outlet(app, tx);
        }
        for def in self.config.on_demand_apps() {
            if let Some(trigger) = &def.launch_on {
                router.add_on_demand(trigger.clone(), def.name.clone());
            }
        }
        self.routing_started = true;
        self.router = Some(router.spawn()?);
        Ok(())
    }

    fn router_finished(&self) -> bool {
        self.router.as_ref().is_none_or(|r| r.is_finished())
    }

    /// Handle events until `done` holds or the engine reports termination.
    fn pump_until(&mut self, done: impl Fn(&Self) -> bool) -> Option<TerminationCause> {
        loop {
            match self.events_rx.try_pop() {
                TryPop::Item(event) => {
                    if let Some(cause) = self.handle_event(event) {
                        return Some(cause);
                    }
                }
                TryPop::Empty => {
                    self.abandon_exited();
                    if done(self) {
                        return None;
                    }
                    thread::sleep(EVENT_POLL);
                }
                TryPop::Closed => return None,
            }
        }
    }

    fn handle_event(&mut self, event: WorkflowEvent) -> Option<TerminationCause> {
        match event {
            WorkflowEvent::BridgeFinished { app, error } => {
                if !self.pending_bridges.remove(&app) {
                    debug!(app = %app, "bridge of an unlaunched application finished");
                } else if let Some(error) = error {
                    warn!(app = %app, %error, "bridge ended with an error");
                }
                None
            }
            WorkflowEvent::LaunchRequested { app } => {
                match self.config.app(&app).cloned() {
                    Some(def) => {
                        if let Err(e) = self.launch(&def) {
                            error!(app = %app, error = %e, "on-demand launch failed");
                        }
                    }
                    None => warn!(app = %app, "launch requested for unknown application"),
                }
                None
            }
            WorkflowEvent::Terminated { cause } => {
                warn!(%cause, "workflow terminated by decision engine");
                Some(cause)
            }
        }
    }

    /// A process that exited before its application connected never will;
    /// stop waiting for it. Heartbeat-monitored apps are left to their
    /// monitor, which turns the same situation into a liveness failure.
    fn abandon_exited(&self) {
        for app in self.table.exited() {
            if !self.pending_bridges.contains(&app) {
                continue;
            }
            let monitored = self
                .config
                .app(&app)
                .is_some_and(|def| def.heartbeat.enabled);
            if !monitored {
                self.table.abandon(&app);
            }
        }
    }

    fn join_all(&mut self) {
        // Unclaimed outlets would keep listener bridges waiting.
        self.outlets.clear();
        if let Some(router) = self.router.take()
            && router.join().is_err()
        {
            error!("signal router thread panicked");
        }
        for (app, handle) in self.table.take_threads() {
            if handle.join().is_err() {
                error!(app = %app, "control-plane thread panicked");
            }
        }
    }
}
