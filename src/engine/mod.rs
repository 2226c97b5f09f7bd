// src/engine/mod.rs

//! Workflow decision engine.
//!
//! A single reactor per workflow decides whether a liveness failure (or an
//! operator interrupt) should tear the whole workflow down.
//!
//! The pure decision state machine lives in [`core`]; the thread that feeds
//! it from a queue and carries out its decision is in [`reactor`].

use std::fmt;

/// Canonical application name type used in events.
pub type AppName = String;

/// Messages consumed by the decision engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionEvent {
    /// A heartbeat monitor gave up on this application.
    HeartbeatNotDetected { app: AppName },
    /// Operator asked the control plane to stop (e.g. Ctrl-C).
    ShutdownRequested,
    /// Clean shutdown of the engine itself; nothing is terminated.
    Quit,
}

/// Why the workflow was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    HeartbeatNotDetected { app: AppName },
    Interrupted,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::HeartbeatNotDetected { app } => {
                write!(f, "heartbeat not detected for '{app}'")
            }
            TerminationCause::Interrupted => f.write_str("interrupted by operator"),
        }
    }
}

/// Events flowing into the supervisor's run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// A control-plane bridge thread ended; `error` is set if it failed.
    BridgeFinished {
        app: AppName,
        error: Option<String>,
    },
    /// The router saw the trigger symbol of an on-demand application.
    LaunchRequested { app: AppName },
    /// The decision engine terminated every application.
    Terminated { cause: TerminationCause },
}

pub mod core;
pub mod reactor;

pub use core::{Decision, DecisionCore, EngineState};
pub use reactor::{spawn_decision_engine, EngineOutcome};
