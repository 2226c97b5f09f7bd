// src/wire/codec.rs

//! Newline-delimited JSON framing over a TCP stream.
//!
//! One value per line, no batching. A `Connection` is owned by exactly one
//! thread; the only thing that may be shared is a cloned socket handle used
//! to shut the stream down from outside (see [`Connection::shutdown_handle`]).

use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::errors::{Result, SteerError};

/// A [`Connection`] starts out `Handshaking`, since it only exists once
/// the TCP stream is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Handshaking,
    Open,
    Closed,
}

#[derive(Debug)]
pub struct Connection {
    peer: String,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    pending: Vec<u8>,
    state: ConnectionState,
}

impl Connection {
    /// Wrap an established stream. `peer` is used in errors and logs only.
    pub fn new(peer: impl Into<String>, stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            peer: peer.into(),
            reader: BufReader::new(stream),
            writer,
            pending: Vec::new(),
            state: ConnectionState::Handshaking,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Write one framed value.
    pub fn send<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        let mut line = serde_json::to_vec(msg)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .and_then(|_| self.writer.flush())
            .map_err(|e| {
                self.state = ConnectionState::Closed;
                SteerError::connection_lost(&self.peer, e)
            })?;
        trace!(peer = %self.peer, bytes = line.len(), "frame sent");
        Ok(())
    }

    /// Block until one framed value arrives.
    ///
    /// EOF or a read failure is `ConnectionLost`.
    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.reader.get_ref().set_read_timeout(None)?;
        match self.read_frame()? {
            Some(v) => Ok(v),
            None => Err(SteerError::connection_lost(
                &self.peer,
                "timed out without a read timeout set",
            )),
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`, returning
    /// `Ok(None)`. A partially received frame is kept for the next call.
    pub fn recv_timeout<T: DeserializeOwned>(&mut self, timeout: Duration) -> Result<Option<T>> {
        // A zero duration is rejected by set_read_timeout.
        let timeout = timeout.max(Duration::from_millis(1));
        self.reader.get_ref().set_read_timeout(Some(timeout))?;
        self.read_frame()
    }

    fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => {
                self.state = ConnectionState::Closed;
                Err(SteerError::connection_lost(&self.peer, "closed by peer"))
            }
            Ok(_) if self.pending.last() != Some(&b'\n') => {
                // EOF in the middle of a frame.
                self.state = ConnectionState::Closed;
                Err(SteerError::connection_lost(
                    &self.peer,
                    "closed by peer mid-frame",
                ))
            }
            Ok(_) => {
                let line = std::mem::take(&mut self.pending);
                let value = serde_json::from_slice(&line)?;
                Ok(Some(value))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
            Err(e) => {
                self.state = ConnectionState::Closed;
                Err(SteerError::connection_lost(&self.peer, e))
            }
        }
    }

    /// A second handle onto the same socket, used to unblock the owning
    /// thread by shutting the stream down.
    pub fn shutdown_handle(&self) -> io::Result<TcpStream> {
        self.writer.try_clone()
    }

    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            let _ = self.writer.shutdown(Shutdown::Both);
            self.state = ConnectionState::Closed;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
