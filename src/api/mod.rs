// src/api/mod.rs

//! Application-side control API: `init`, `check`, `signal`, `heartbeat`,
//! `finalize`.

pub mod context;
pub mod handlers;
pub mod identity;

pub use context::{Callback, CheckOutcome, ControlContext};
pub use handlers::SignalHandlers;
pub use identity::{AppIdentity, ENV_APP, ENV_CONN_DIR, ENV_HEARTBEAT, ENV_ROLE, RANK_VARS};
