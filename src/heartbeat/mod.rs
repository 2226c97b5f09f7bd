// src/heartbeat/mod.rs

//! Heartbeat-based liveness detection.
//!
//! Each monitored application has a second connection, at the signal
//! rendezvous port + 1, that carries nothing but pulses.
//!
//! - [`emitter`] is the application side: a thread forwarding heartbeats
//!   requested by the application's main loop.
//! - [`monitor`] is the control-plane side: a thread that reports
//!   `HeartbeatNotDetected` to the decision engine when pulses stop.

use serde::{Deserialize, Serialize};

/// One message on the heartbeat channel. Only arrival matters; the beat
/// counter is for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pulse {
    Beat(u64),
    /// The application is finishing normally; stop monitoring quietly.
    Farewell,
}

pub mod emitter;
pub mod monitor;

pub use emitter::{HeartbeatCommand, HeartbeatEmitter};
pub use monitor::{HeartbeatMonitor, MonitorOutcome};
