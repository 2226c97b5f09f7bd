// src/bridge/relay.rs

//! The two relay loops a bridge can run.
//!
//! Both loops stop after handling a terminal signal (`SIGTERM` or `DONE`),
//! compared by exact variant.

use tracing::{debug, warn};

use crate::errors::Result;
use crate::queue::{QueueReceiver, QueueSender};
use crate::signal::Signal;
use crate::types::RelayDirection;
use crate::wire::Connection;

/// Queue → wire. Block-pops a signal and writes it.
///
/// If the queue closes (every producer dropped) the peer is told `DONE`.
/// Returns the terminal signal that ended the loop.
pub fn listener(
    app: &str,
    queue: &mut QueueReceiver<Signal>,
    conn: &mut Connection,
) -> Result<Signal> {
    loop {
        debug!(app, "waiting for signal in queue");
        let signal = match queue.pop() {
            Some(s) => s,
            None => {
                debug!(app, "queue closed; telling peer DONE");
                Signal::Done
            }
        };

        debug!(app, %signal, "forwarding signal to peer");
        conn.send(&signal)?;

        if signal.is_terminal() {
            debug!(app, %signal, "listener relay finished");
            return Ok(signal);
        }
    }
}

/// Wire → queue. Block-reads a signal and pushes it.
///
/// Signals are still read to the end of the stream when the local consumer
/// has gone away, so the peer never blocks on a full socket.
pub fn sender(app: &str, queue: &QueueSender<Signal>, conn: &mut Connection) -> Result<Signal> {
    loop {
        debug!(app, "waiting for signal from peer");
        let signal: Signal = conn.recv()?;

        debug!(app, %signal, "received signal; pushing to queue");
        if queue.push(signal.clone()).is_err() {
            warn!(app, %signal, "local consumer gone; dropping signal");
        }

        if signal.is_terminal() {
            debug!(app, %signal, "sender relay finished");
            return Ok(signal);
        }
    }
}

/// Local end of a relay, matching its direction.
#[derive(Debug)]
pub enum RelayEndpoint {
    Outbound(QueueReceiver<Signal>),
    Inbound(QueueSender<Signal>),
}

impl RelayEndpoint {
    pub fn direction(&self) -> RelayDirection {
        match self {
            RelayEndpoint::Outbound(_) => RelayDirection::QueueToWire,
            RelayEndpoint::Inbound(_) => RelayDirection::WireToQueue,
        }
    }
}

/// Run whichever loop the endpoint calls for.
pub fn run_relay(app: &str, endpoint: &mut RelayEndpoint, conn: &mut Connection) -> Result<Signal> {
    match endpoint {
        RelayEndpoint::Outbound(rx) => listener(app, rx, conn),
        RelayEndpoint::Inbound(tx) => sender(app, tx, conn),
    }
}
