// src/supervisor/ports.rs

use std::io;
use std::net::TcpListener;

use anyhow::anyhow;
use tracing::debug;

use crate::errors::{Result, SteerError};
use crate::wire::RendezvousAddr;

/// Attempts at finding an adjacent free pair when ports are OS-assigned.
const EPHEMERAL_ATTEMPTS: usize = 32;

/// Hands out (signal, heartbeat) port pairs, heartbeat = signal + 1.
///
/// With a non-zero base the pairs are `base, base+2, ...`; pairs that fail
/// to bind are skipped. A base of `0` takes OS-assigned ports instead.
#[derive(Debug)]
pub struct PortAllocator {
    host: String,
    base: u16,
    next: u16,
}

/// A bound port pair and the address to publish for it.
#[derive(Debug)]
pub struct PortPair {
    pub signal: TcpListener,
    pub heartbeat: TcpListener,
    pub addr: RendezvousAddr,
}

impl PortAllocator {
    pub fn new(host: impl Into<String>, base: u16) -> Self {
        Self {
            host: host.into(),
            base,
            next: base,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn allocate_pair(&mut self) -> Result<PortPair> {
        if self.base == 0 {
            return self.allocate_ephemeral();
        }

        while self.next < u16::MAX {
            let port = self.next;
            self.next = self.next.saturating_add(2);
            match self.bind_pair(port) {
                Ok(pair) => return Ok(pair),
                Err(e) => debug!(port, error = %e, "port pair unavailable; skipping"),
            }
        }
        Err(SteerError::Other(anyhow!(
            "no free port pair on {} from base port {}",
            self.host,
            self.base
        )))
    }

    fn allocate_ephemeral(&mut self) -> Result<PortPair> {
        for _ in 0..EPHEMERAL_ATTEMPTS {
            let signal = TcpListener::bind((self.host.as_str(), 0))?;
            let port = signal.local_addr()?.port();
            if port == u16::MAX {
                continue;
            }
            match TcpListener::bind((self.host.as_str(), port + 1)) {
                Ok(heartbeat) => return Ok(self.pair(signal, heartbeat, port)),
                Err(e) => debug!(port, error = %e, "neighbouring heartbeat port taken; retrying"),
            }
        }
        Err(SteerError::Other(anyhow!(
            "no adjacent free port pair on {} after {EPHEMERAL_ATTEMPTS} attempts",
            self.host
        )))
    }

    fn bind_pair(&self, port: u16) -> io::Result<PortPair> {
        let signal = TcpListener::bind((self.host.as_str(), port))?;
        let heartbeat = TcpListener::bind((self.host.as_str(), port + 1))?;
        Ok(self.pair(signal, heartbeat, port))
    }

    fn pair(&self, signal: TcpListener, heartbeat: TcpListener, port: u16) -> PortPair {
        PortPair {
            signal,
            heartbeat,
            addr: RendezvousAddr::new(self.host.clone(), port),
        }
    }
}
