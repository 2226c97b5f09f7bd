// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SteerError {
    /// The first message on a fresh connection was not `READY`.
    #[error("handshake with '{peer}' failed: expected {expected}, received {actual}")]
    Handshake {
        peer: String,
        expected: String,
        actual: String,
    },

    /// A signal outside the valid set for the call was observed.
    #[error("protocol violation from '{peer}': expected {expected}, received {actual}")]
    Protocol {
        peer: String,
        expected: String,
        actual: String,
    },

    #[error("connection to '{peer}' lost: {reason}")]
    ConnectionLost { peer: String, reason: String },

    #[error("failed to launch '{app}': {reason}")]
    Launch { app: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("wire codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SteerError {
    pub fn connection_lost(peer: impl Into<String>, reason: impl ToString) -> Self {
        SteerError::ConnectionLost {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }

    pub fn launch(app: impl Into<String>, reason: impl ToString) -> Self {
        SteerError::Launch {
            app: app.into(),
            reason: reason.to_string(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SteerError>;
