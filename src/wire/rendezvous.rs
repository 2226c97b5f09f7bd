// src/wire/rendezvous.rs

//! Rendezvous discovery through `<app>.conn_info` files.
//!
//! The control plane writes one line, `hostname:port`, before the
//! application is started. The application reads that exact file to find
//! where to connect. The heartbeat channel lives at `port + 1`.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::errors::{Result, SteerError};

pub const CONN_INFO_EXT: &str = "conn_info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousAddr {
    pub host: String,
    pub port: u16,
}

impl RendezvousAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Address of the heartbeat channel paired with this signal address.
    pub fn heartbeat(&self) -> RendezvousAddr {
        RendezvousAddr::new(self.host.clone(), self.port.wrapping_add(1))
    }
}

impl fmt::Display for RendezvousAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for RendezvousAddr {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("malformed rendezvous address '{s}' (expected host:port)"))?;
        if host.is_empty() {
            return Err(format!("rendezvous address '{s}' has an empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in rendezvous address '{s}': {e}"))?;
        Ok(RendezvousAddr::new(host, port))
    }
}

pub fn conn_info_path(dir: &Path, app: &str) -> PathBuf {
    dir.join(format!("{app}.{CONN_INFO_EXT}"))
}

/// Write the rendezvous file for `app`. Overwrites a stale file.
pub fn publish(dir: &Path, app: &str, addr: &RendezvousAddr) -> Result<PathBuf> {
    let path = conn_info_path(dir, app);
    debug!(app, %addr, path = ?path, "publishing connection info");
    fs::write(&path, addr.to_string())?;
    Ok(path)
}

/// Read the rendezvous file for `app`.
pub fn discover(dir: &Path, app: &str) -> Result<RendezvousAddr> {
    let path = conn_info_path(dir, app);
    debug!(app, path = ?path, "looking for connection info");
    let contents = fs::read_to_string(&path).map_err(|e| {
        SteerError::connection_lost(app, format!("cannot read {}: {e}", path.display()))
    })?;
    let line = contents.lines().next().unwrap_or_default();
    line.parse::<RendezvousAddr>()
        .map_err(|e| SteerError::connection_lost(app, e))
}

/// Remove the rendezvous file; a missing file is fine.
pub fn retract(dir: &Path, app: &str) {
    let path = conn_info_path(dir, app);
    match fs::remove_file(&path) {
        Ok(()) => debug!(app, path = ?path, "removed connection info"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(app, path = ?path, error = %e, "failed to remove connection info"),
    }
}
