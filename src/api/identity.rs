// src/api/identity.rs

//! Who an application is, as told to it by the supervisor.
//!
//! The supervisor passes identity through environment variables when it
//! launches an application; the application reads them back with
//! [`AppIdentity::from_env`]. The bridge role is always explicit here and is
//! never guessed from the application's name.

use std::path::PathBuf;

use crate::errors::{Result, SteerError};
use crate::types::BridgeRole;

pub const ENV_APP: &str = "STEERFLOW_APP";
pub const ENV_ROLE: &str = "STEERFLOW_ROLE";
pub const ENV_CONN_DIR: &str = "STEERFLOW_CONN_DIR";
pub const ENV_HEARTBEAT: &str = "STEERFLOW_HEARTBEAT";

/// Rank variables set by common parallel launchers, checked in order.
pub const RANK_VARS: [&str; 4] = ["STEERFLOW_RANK", "PMI_RANK", "OMPI_COMM_WORLD_RANK", "SLURM_PROCID"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub name: String,
    pub role: BridgeRole,
    pub conn_dir: PathBuf,
    pub heartbeat: bool,
    /// Whether this process is the application's single point of contact
    /// (conventionally rank 0).
    pub coordinator: bool,
}

impl AppIdentity {
    pub fn new(name: impl Into<String>, role: BridgeRole) -> Self {
        Self {
            name: name.into(),
            role,
            conn_dir: PathBuf::from("."),
            heartbeat: false,
            coordinator: true,
        }
    }

    pub fn with_conn_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.conn_dir = dir.into();
        self
    }

    pub fn with_heartbeat(mut self, enabled: bool) -> Self {
        self.heartbeat = enabled;
        self
    }

    pub fn with_coordinator(mut self, coordinator: bool) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Read identity from this process's environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Read identity from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut name = None;
        let mut role = None;
        let mut conn_dir = None;
        let mut heartbeat = false;
        let mut ranks: Vec<(usize, String)> = Vec::new();

        for (k, v) in vars {
            let key = k.as_ref();
            let value: String = v.into();
            match key {
                ENV_APP => name = Some(value),
                ENV_ROLE => role = Some(value),
                ENV_CONN_DIR => conn_dir = Some(PathBuf::from(value)),
                ENV_HEARTBEAT => heartbeat = is_truthy(&value),
                _ => {
                    if let Some(pos) = RANK_VARS.iter().position(|r| *r == key) {
                        ranks.push((pos, value));
                    }
                }
            }
        }

        let name = name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| SteerError::Config(format!("{ENV_APP} is not set")))?;
        let role: BridgeRole = role
            .ok_or_else(|| SteerError::Config(format!("{ENV_ROLE} is not set for '{name}'")))?
            .parse()
            .map_err(SteerError::Config)?;

        ranks.sort_by_key(|(pos, _)| *pos);
        let coordinator = match ranks.first() {
            Some((_, rank)) => rank.trim() == "0",
            None => true,
        };

        Ok(Self {
            name,
            role,
            conn_dir: conn_dir.unwrap_or_else(|| PathBuf::from(".")),
            heartbeat,
            coordinator,
        })
    }

    /// Variables the supervisor hands to a launched application.
    pub fn to_env(&self) -> Vec<(String, String)> {
        vec![
            (ENV_APP.to_string(), self.name.clone()),
            (ENV_ROLE.to_string(), self.role.as_str().to_string()),
            (ENV_CONN_DIR.to_string(), self.conn_dir.display().to_string()),
            (
                ENV_HEARTBEAT.to_string(),
                if self.heartbeat { "1" } else { "0" }.to_string(),
            ),
        ]
    }
}

fn is_truthy(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
