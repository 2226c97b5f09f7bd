// src/api/context.rs

//! Per-application control context.
//!
//! A `ControlContext` is created by [`ControlContext::init`] on every
//! process of an application, but only the coordinator's context is live:
//! it owns the application side of the connection bridge, the local signal
//! queue, the optional heartbeat emitter and the checkpoint/cleanup
//! callbacks. On every other process each operation is a no-op and the
//! caller is expected to broadcast the coordinator's [`CheckOutcome`] over
//! its own collective mechanism.

use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::api::handlers::SignalHandlers;
use crate::api::identity::AppIdentity;
use crate::bridge::relay::{run_relay, RelayEndpoint};
use crate::errors::{Result, SteerError};
use crate::heartbeat::HeartbeatEmitter;
use crate::queue::{queue, QueueReceiver, QueueSender, TryPop};
use crate::signal::Signal;
use crate::types::{BridgeRole, RelayDirection};
use crate::wire::{self, Connection};

/// Checkpoint or cleanup routine, called with the arguments given to `check`.
pub type Callback<A> = Box<dyn FnMut(&A) + Send>;

/// Result of one `check` poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Keep going.
    Continue,
    /// Checkpoint and cleanup have run; stop the main loop.
    Terminate,
}

impl CheckOutcome {
    /// Integer form (0 or 1), convenient for broadcasting to sibling ranks.
    pub fn code(self) -> i32 {
        match self {
            CheckOutcome::Continue => 0,
            CheckOutcome::Terminate => 1,
        }
    }

    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            CheckOutcome::Continue
        } else {
            CheckOutcome::Terminate
        }
    }

    pub fn should_stop(self) -> bool {
        self == CheckOutcome::Terminate
    }
}

type BridgeThread = JoinHandle<Result<Option<Signal>>>;

/// Application side of a bridge, owned by the coordinator's context.
struct BridgeLink {
    app: String,
    role: BridgeRole,
    inbound: Option<QueueReceiver<Signal>>,
    outbound: Option<QueueSender<Signal>>,
    socket: TcpStream,
    closing: Arc<AtomicBool>,
    thread: Option<BridgeThread>,
    heartbeat: Option<HeartbeatEmitter>,
}

impl BridgeLink {
    fn join(&mut self) -> Result<()> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(Ok(last)) => {
                debug!(app = %self.app, ?last, "bridge thread joined");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SteerError::Other(anyhow!(
                "bridge thread for '{}' panicked",
                self.app
            ))),
        }
    }

    fn close_socket(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.socket.shutdown(Shutdown::Both);
    }
}

impl Drop for BridgeLink {
    fn drop(&mut self) {
        // Unblock the relay thread; it is not joined here.
        if self.thread.is_some() {
            self.close_socket();
        }
    }
}

pub struct ControlContext<C = (), K = ()> {
    identity: AppIdentity,
    checkpoint: Option<Callback<C>>,
    cleanup: Option<Callback<K>>,
    link: Option<BridgeLink>,
    terminated: bool,
}

impl<C, K> std::fmt::Debug for ControlContext<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlContext")
            .field("identity", &self.identity)
            .field("connected", &self.link.is_some())
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl ControlContext<(), ()> {
    /// `init` for applications without checkpoint or cleanup routines,
    /// typically watchdog / analysis codes.
    pub fn init_without_callbacks(identity: AppIdentity) -> Result<Self> {
        Self::init(identity, None, None)
    }
}

impl<C, K> ControlContext<C, K> {
    /// Connect this application to the control plane.
    ///
    /// On the coordinator this discovers the rendezvous address, connects,
    /// sends `READY`, starts the bridge thread (and the heartbeat thread if
    /// enabled) and returns once the connection is open. Elsewhere it
    /// returns immediately.
    pub fn init(
        identity: AppIdentity,
        checkpoint: Option<Callback<C>>,
        cleanup: Option<Callback<K>>,
    ) -> Result<Self> {
        let mut ctx = Self {
            identity,
            checkpoint,
            cleanup,
            link: None,
            terminated: false,
        };

        if !ctx.identity.coordinator {
            debug!(app = %ctx.identity.name, "not the coordinator; control plane not joined");
            return Ok(ctx);
        }

        let app = ctx.identity.name.clone();
        let role = ctx.identity.role;
        let addr = wire::discover(&ctx.identity.conn_dir, &app)?;
        debug!(app = %app, %addr, "found connection info");

        let conn = wire::connect_and_announce(&app, &addr)?;
        let socket = conn.shutdown_handle()?;
        let closing = Arc::new(AtomicBool::new(false));

        let (tx, rx) = queue::<Signal>();
        let (endpoint, inbound, outbound) = match role.app_direction() {
            RelayDirection::WireToQueue => (RelayEndpoint::Inbound(tx), Some(rx), None),
            RelayDirection::QueueToWire => (RelayEndpoint::Outbound(rx), None, Some(tx)),
        };

        let thread = {
            let app = app.clone();
            let closing = Arc::clone(&closing);
            thread::Builder::new()
                .name(format!("bridge-{app}"))
                .spawn(move || app_relay(app, endpoint, conn, closing))?
        };

        ctx.link = Some(BridgeLink {
            app: app.clone(),
            role,
            inbound,
            outbound,
            socket,
            closing,
            thread: Some(thread),
            heartbeat: None,
        });

        if ctx.identity.heartbeat {
            let emitter = HeartbeatEmitter::start(&app, &addr.heartbeat())?;
            if let Some(link) = ctx.link.as_mut() {
                link.heartbeat = Some(emitter);
            }
        }

        info!(app = %app, %role, "joined control plane");
        Ok(ctx)
    }

    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    pub fn is_coordinator(&self) -> bool {
        self.identity.coordinator
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Non-blocking poll for a control signal.
    ///
    /// Valid signals are `CONTINUE`, `SIGTERM`, `DONE` and the symbols
    /// registered in `handlers`; anything else is a protocol error. On
    /// `SIGTERM` the checkpoint then the cleanup routine run (once per
    /// context), the bridge thread is joined, and `Terminate` is returned
    /// from then on.
    pub fn check(
        &mut self,
        checkpoint_args: &C,
        cleanup_args: &K,
        handlers: &mut SignalHandlers,
    ) -> Result<CheckOutcome> {
        if self.terminated {
            return Ok(CheckOutcome::Terminate);
        }
        let Some(link) = self.link.as_mut() else {
            return Ok(CheckOutcome::Continue);
        };

        let signal = match link.inbound.as_mut().map(|rx| rx.try_pop()) {
            None | Some(TryPop::Empty) => Signal::Continue,
            Some(TryPop::Item(signal)) => signal,
            Some(TryPop::Closed) => {
                // The bridge ended; surface its failure, if any, once.
                link.inbound = None;
                link.join()?;
                Signal::Continue
            }
        };

        match signal {
            Signal::Continue => Ok(CheckOutcome::Continue),
            Signal::Done => {
                debug!(app = %link.app, "peer finished normally");
                Ok(CheckOutcome::Continue)
            }
            Signal::Sigterm => {
                info!(app = %link.app, "SIGTERM received; checkpointing and cleaning up");
                if let Some(checkpoint) = self.checkpoint.as_mut() {
                    checkpoint(checkpoint_args);
                }
                if let Some(cleanup) = self.cleanup.as_mut() {
                    cleanup(cleanup_args);
                }
                self.terminated = true;
                link.join()?;
                Ok(CheckOutcome::Terminate)
            }
            other if handlers.contains(&other) => {
                debug!(app = %link.app, signal = %other, "dispatching application signal");
                handlers.invoke(&other);
                Ok(CheckOutcome::Continue)
            }
            other => {
                let mut expected = vec!["CONTINUE".to_string(), "SIGTERM".to_string(), "DONE".to_string()];
                expected.extend(handlers.symbols());
                Err(SteerError::Protocol {
                    peer: link.app.clone(),
                    expected: format!("one of {}", expected.join(", ")),
                    actual: other.to_string(),
                })
            }
        }
    }

    /// Queue a signal for relay to the control plane.
    ///
    /// Only sender-role applications originate signals.
    pub fn signal(&mut self, signal: impl Into<Signal>) -> Result<()> {
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };
        let signal = signal.into();

        let Some(tx) = link.outbound.as_ref() else {
            return Err(SteerError::Protocol {
                peer: link.app.clone(),
                expected: "a sender-role application".to_string(),
                actual: format!("{} role signalling {signal}", link.role),
            });
        };

        debug!(app = %link.app, %signal, "queueing signal");
        if tx.push(signal).is_err() {
            link.outbound = None;
            link.join()?;
            return Err(SteerError::connection_lost(
                &link.app,
                "bridge already finished",
            ));
        }
        Ok(())
    }

    /// Record one heartbeat. No-op unless heartbeats are enabled.
    pub fn heartbeat(&self) {
        if let Some(hb) = self.link.as_ref().and_then(|l| l.heartbeat.as_ref()) {
            hb.beat();
        }
    }

    /// Leave the control plane: tell the peer we are done, join the bridge
    /// and heartbeat threads, release the connection.
    pub fn finalize(mut self) -> Result<()> {
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };

        match link.role {
            BridgeRole::Sender => {
                if let Some(tx) = link.outbound.take() {
                    let _ = tx.push(Signal::Done);
                }
            }
            BridgeRole::Listener => {
                link.inbound = None;
                link.close_socket();
            }
        }

        let bridge = link.join();
        let heartbeat = match link.heartbeat.take() {
            Some(hb) => hb.stop().map_err(SteerError::from),
            None => Ok(()),
        };

        info!(app = %link.app, "left control plane");
        bridge?;
        heartbeat
    }
}

/// Body of the application-side bridge thread.
fn app_relay(
    app: String,
    mut endpoint: RelayEndpoint,
    mut conn: Connection,
    closing: Arc<AtomicBool>,
) -> Result<Option<Signal>> {
    match run_relay(&app, &mut endpoint, &mut conn) {
        Ok(last) => {
            conn.close();
            Ok(Some(last))
        }
        Err(SteerError::ConnectionLost { .. }) if closing.load(Ordering::SeqCst) => {
            debug!(app = %app, "connection closed locally");
            Ok(None)
        }
        Err(e) => {
            warn!(app = %app, error = %e, "bridge thread failed");
            Err(e)
        }
    }
}
