// src/bridge/server.rs

//! Control-plane side of a connection bridge.
//!
//! One thread per application: accept the application's connection on the
//! pre-bound listener, require `READY`, relay in the configured role until a
//! terminal signal, then remove the rendezvous file and report back to the
//! supervisor.

use std::io;
use std::net::TcpListener;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::bridge::relay::{run_relay, RelayEndpoint};
use crate::engine::WorkflowEvent;
use crate::errors::Result;
use crate::queue::QueueSender;
use crate::signal::Signal;
use crate::types::BridgeRole;
use crate::wire::{self, AcceptAbort, Connection, ShutdownFlag};

/// How a control-plane bridge thread ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeExit {
    /// Relayed until this terminal signal.
    Finished(Signal),
    /// The application never connected before the workflow was torn down.
    Aborted,
}

/// Everything a control-plane bridge thread needs.
#[derive(Debug)]
pub struct ControlBridge {
    pub app: String,
    pub role: BridgeRole,
    pub listener: TcpListener,
    pub endpoint: RelayEndpoint,
    pub conn_dir: PathBuf,
    pub shutdown: ShutdownFlag,
}

impl ControlBridge {
    /// Start the bridge thread. Its outcome is reported as
    /// [`WorkflowEvent::BridgeFinished`] on `events`.
    pub fn spawn(self, events: QueueSender<WorkflowEvent>) -> io::Result<JoinHandle<()>> {
        let name = format!("bridge-{}", self.app);
        thread::Builder::new().name(name).spawn(move || {
            let app = self.app.clone();
            let result = self.serve();
            let error = match &result {
                Ok(exit) => {
                    info!(app = %app, ?exit, "bridge finished");
                    None
                }
                Err(e) => {
                    error!(app = %app, error = %e, "bridge failed");
                    Some(e.to_string())
                }
            };
            if events
                .push(WorkflowEvent::BridgeFinished { app: app.clone(), error })
                .is_err()
            {
                debug!(app = %app, "supervisor gone; bridge outcome not reported");
            }
        })
    }

    fn serve(mut self) -> Result<BridgeExit> {
        debug!(app = %self.app, role = %self.role, "listening for incoming connection");

        let stream = match wire::accept_until(&self.listener, None, &self.shutdown)? {
            Ok(stream) => stream,
            Err(AcceptAbort::ShutdownRequested) | Err(AcceptAbort::DeadlineElapsed) => {
                warn!(app = %self.app, "workflow closed before the application connected");
                return Ok(BridgeExit::Aborted);
            }
        };

        let mut conn = Connection::new(self.app.clone(), stream)?;
        info!(app = %self.app, "established connection");

        debug!(app = %self.app, "waiting for ready signal");
        wire::expect_ready(&mut conn)?;

        let last = run_relay(&self.app, &mut self.endpoint, &mut conn)?;

        conn.close();
        wire::retract(&self.conn_dir, &self.app);
        info!(app = %self.app, signal = %last, "closing connection");
        Ok(BridgeExit::Finished(last))
    }
}
