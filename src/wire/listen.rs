// src/wire/listen.rs

//! Accepting and establishing connections, including the `READY` handshake.

use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::errors::{Result, SteerError};
use crate::signal::Signal;
use crate::wire::codec::{Connection, ConnectionState};
use crate::wire::rendezvous::RendezvousAddr;

/// How often a pending accept re-checks its deadline and the workflow flag.
pub const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// Set once the workflow has been torn down; pending accepts give up.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why `accept_until` returned without a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptAbort {
    DeadlineElapsed,
    ShutdownRequested,
}

/// Wait for one incoming connection.
///
/// Polls so that the wait can end on `deadline` (if any) or when `shutdown`
/// is triggered. The returned stream is in blocking mode.
pub fn accept_until(
    listener: &TcpListener,
    deadline: Option<Instant>,
    shutdown: &ShutdownFlag,
) -> Result<std::result::Result<TcpStream, AcceptAbort>> {
    listener.set_nonblocking(true)?;
    loop {
        match listener.accept() {
            Ok((stream, remote)) => {
                stream.set_nonblocking(false)?;
                debug!(%remote, "accepted connection");
                return Ok(Ok(stream));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if shutdown.is_triggered() {
                    return Ok(Err(AcceptAbort::ShutdownRequested));
                }
                let now = Instant::now();
                match deadline {
                    Some(d) if now >= d => return Ok(Err(AcceptAbort::DeadlineElapsed)),
                    Some(d) => thread::sleep(ACCEPT_POLL.min(d - now)),
                    None => thread::sleep(ACCEPT_POLL),
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Application side: connect to the published address and announce `READY`.
pub fn connect_and_announce(peer: &str, addr: &RendezvousAddr) -> Result<Connection> {
    debug!(peer, %addr, "connecting");
    let stream = TcpStream::connect((addr.host.as_str(), addr.port))
        .map_err(|e| SteerError::connection_lost(peer, format!("connect to {addr}: {e}")))?;
    let mut conn = Connection::new(peer, stream)?;
    conn.set_state(ConnectionState::Handshaking);
    conn.send(&Signal::Ready)?;
    conn.set_state(ConnectionState::Open);
    info!(peer, %addr, "connection established");
    Ok(conn)
}

/// Control-plane side: the first message must be `READY`.
///
/// On anything else the connection is closed and a `Handshake` error
/// returned; the connection must not be used afterwards.
pub fn expect_ready(conn: &mut Connection) -> Result<()> {
    conn.set_state(ConnectionState::Handshaking);
    let actual = match conn.recv::<Signal>() {
        Ok(signal) => signal.to_string(),
        Err(SteerError::Codec(e)) => format!("<undecodable frame: {e}>"),
        Err(e) => {
            conn.close();
            return Err(e);
        }
    };

    if actual == Signal::Ready.symbol() {
        conn.set_state(ConnectionState::Open);
        debug!(peer = %conn.peer(), "handshake complete");
        return Ok(());
    }

    conn.close();
    Err(SteerError::Handshake {
        peer: conn.peer().to_string(),
        expected: Signal::Ready.to_string(),
        actual,
    })
}
