// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Role of a connection bridge, named from the control plane's side.
///
/// - `Listener`: the control plane pulls signals from its queue and writes
///   them to the wire. Used for steered applications (the simulation), which
///   only *receive* control.
/// - `Sender`: the control plane reads signals from the wire and pushes them
///   into its inbox. Used for watchdog / analysis applications, which only
///   *originate* control.
///
/// The application side of a bridge always relays in the opposite direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeRole {
    Listener,
    Sender,
}

/// Which way a relay loop moves signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDirection {
    /// Pop from a local queue, write to the connection.
    QueueToWire,
    /// Read from the connection, push to a local queue.
    WireToQueue,
}

impl BridgeRole {
    pub fn control_plane_direction(self) -> RelayDirection {
        match self {
            BridgeRole::Listener => RelayDirection::QueueToWire,
            BridgeRole::Sender => RelayDirection::WireToQueue,
        }
    }

    pub fn app_direction(self) -> RelayDirection {
        match self {
            BridgeRole::Listener => RelayDirection::WireToQueue,
            BridgeRole::Sender => RelayDirection::QueueToWire,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BridgeRole::Listener => "listener",
            BridgeRole::Sender => "sender",
        }
    }
}

impl fmt::Display for BridgeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "listener" => Ok(BridgeRole::Listener),
            "sender" => Ok(BridgeRole::Sender),
            other => Err(format!(
                "invalid bridge role: {other} (expected \"listener\" or \"sender\")"
            )),
        }
    }
}

/// Parallel-job launcher used to wrap application executables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LauncherKind {
    /// Slurm `srun`.
    Srun,
    /// Generic `mpirun -np`.
    Mpirun,
    /// Run the executable as-is (local runs, tests).
    Direct,
}

impl Default for LauncherKind {
    fn default() -> Self {
        LauncherKind::Srun
    }
}

impl FromStr for LauncherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "srun" => Ok(LauncherKind::Srun),
            "mpirun" => Ok(LauncherKind::Mpirun),
            "direct" => Ok(LauncherKind::Direct),
            other => Err(format!(
                "invalid launcher: {other} (expected \"srun\", \"mpirun\" or \"direct\")"
            )),
        }
    }
}
