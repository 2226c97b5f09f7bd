// src/signal.rs

//! The control-plane signal vocabulary.
//!
//! Signals are immutable symbols compared by identity. The canonical members
//! have fixed wire names; anything else is an application-defined extension
//! symbol, carried verbatim and dispatched through caller-supplied handlers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const CONTINUE: &str = "CONTINUE";
pub const SIGTERM: &str = "SIGTERM";
pub const READY: &str = "READY";
pub const DONE: &str = "DONE";
pub const HEARTBEAT_NOT_DETECTED: &str = "HEARTBEAT_NOT_DETECTED";

/// A single control message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Signal {
    /// Protocol no-op; what `check` sees when nothing is pending.
    Continue,
    /// Request a safe shutdown (checkpoint, cleanup, stop).
    Sigterm,
    /// Handshake acknowledgement from the connecting side.
    Ready,
    /// The peer finished normally.
    Done,
    /// Liveness failure.
    HeartbeatNotDetected,
    /// Application-defined symbol.
    Custom(String),
}

impl Signal {
    /// Build a signal from a symbol. Canonical names always map onto their
    /// canonical variant, so `Signal::custom("DONE") == Signal::Done`.
    pub fn custom(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        match symbol.as_str() {
            CONTINUE => Signal::Continue,
            SIGTERM => Signal::Sigterm,
            READY => Signal::Ready,
            DONE => Signal::Done,
            HEARTBEAT_NOT_DETECTED => Signal::HeartbeatNotDetected,
            _ => Signal::Custom(symbol),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Signal::Continue => CONTINUE,
            Signal::Sigterm => SIGTERM,
            Signal::Ready => READY,
            Signal::Done => DONE,
            Signal::HeartbeatNotDetected => HEARTBEAT_NOT_DETECTED,
            Signal::Custom(s) => s.as_str(),
        }
    }

    /// Whether a relay loop stops after handling this signal.
    ///
    /// Exact variant match: `HeartbeatNotDetected` is *not* terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Signal::Sigterm | Signal::Done)
    }

    pub fn is_extension(&self) -> bool {
        matches!(self, Signal::Custom(_))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty signal symbol".to_string());
        }
        Ok(Signal::custom(s))
    }
}

impl TryFrom<String> for Signal {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err("empty signal symbol".to_string());
        }
        Ok(Signal::custom(value))
    }
}

impl From<Signal> for String {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Custom(s) => s,
            other => other.symbol().to_string(),
        }
    }
}

impl From<&str> for Signal {
    fn from(symbol: &str) -> Self {
        Signal::custom(symbol)
    }
}
