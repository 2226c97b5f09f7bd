// src/heartbeat/monitor.rs

use std::io;
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::engine::DecisionEvent;
use crate::errors::{Result, SteerError};
use crate::heartbeat::Pulse;
use crate::queue::QueueSender;
use crate::wire::{self, AcceptAbort, Connection, ShutdownFlag};

/// How a monitor thread ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The application said farewell.
    Farewell,
    /// Liveness failure reported to the decision engine.
    Reported { reason: String },
    /// The workflow was torn down underneath the monitor.
    Aborted,
}

/// Control-plane side of one application's heartbeat channel.
///
/// Single-shot: once it reports a failure it exits and never re-arms.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    pub app: String,
    pub listener: TcpListener,
    pub heart_rate: Duration,
    pub shutdown: ShutdownFlag,
}

impl HeartbeatMonitor {
    pub fn spawn(self, decisions: QueueSender<DecisionEvent>) -> io::Result<JoinHandle<()>> {
        let name = format!("heartbeat-{}", self.app);
        thread::Builder::new().name(name).spawn(move || {
            let app = self.app.clone();
            let outcome = self.watch(&decisions);
            debug!(app = %app, ?outcome, "heartbeat monitor exiting");
        })
    }

    /// Run the monitor on the current thread.
    pub fn watch(self, decisions: &QueueSender<DecisionEvent>) -> MonitorOutcome {
        info!(
            app = %self.app,
            heart_rate = ?self.heart_rate,
            "heartbeat monitor started"
        );

        let reason = match self.wait_for_failure() {
            Ok(None) => {
                info!(app = %self.app, "application said farewell; heartbeat monitor done");
                return MonitorOutcome::Farewell;
            }
            Ok(Some(reason)) => reason,
            Err(e) => e.to_string(),
        };

        if self.shutdown.is_triggered() {
            debug!(app = %self.app, %reason, "workflow already closing; not reporting");
            return MonitorOutcome::Aborted;
        }

        error!(
            app = %self.app,
            heart_rate = ?self.heart_rate,
            %reason,
            "heartbeat not detected; notifying decision engine"
        );
        if decisions
            .push(DecisionEvent::HeartbeatNotDetected {
                app: self.app.clone(),
            })
            .is_err()
        {
            warn!(app = %self.app, "decision engine gone; failure not delivered");
        }
        MonitorOutcome::Reported { reason }
    }

    /// `Ok(None)` on farewell, `Ok(Some(reason))` on a liveness failure.
    fn wait_for_failure(&self) -> Result<Option<String>> {
        let deadline = Instant::now() + self.heart_rate;
        let stream = match wire::accept_until(&self.listener, Some(deadline), &self.shutdown)? {
            Ok(stream) => stream,
            Err(AcceptAbort::DeadlineElapsed) => {
                return Ok(Some(format!(
                    "no heartbeat connection within {:?}",
                    self.heart_rate
                )));
            }
            Err(AcceptAbort::ShutdownRequested) => {
                return Ok(Some("workflow closed".to_string()));
            }
        };

        let mut conn = Connection::new(format!("{}/heartbeat", self.app), stream)?;
        wire::expect_ready(&mut conn)?;
        info!(app = %self.app, "heartbeat connection established");

        loop {
            match conn.recv_timeout::<Pulse>(self.heart_rate) {
                Ok(Some(Pulse::Beat(n))) => {
                    debug!(app = %self.app, beat = n, "heartbeat received");
                }
                Ok(Some(Pulse::Farewell)) => return Ok(None),
                Ok(None) => {
                    return Ok(Some(format!("no heartbeat within {:?}", self.heart_rate)));
                }
                Err(SteerError::Codec(e)) => {
                    // Payload is opaque: an unreadable pulse still arrived.
                    debug!(app = %self.app, error = %e, "unrecognised pulse counted as heartbeat");
                }
                Err(e) => return Ok(Some(e.to_string())),
            }
        }
    }
}
