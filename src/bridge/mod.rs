// src/bridge/mod.rs

//! Connection bridges: relaying signals between a local queue and a peer.
//!
//! - [`relay`] holds the two loops (`listener`: queue → wire, `sender`:
//!   wire → queue) shared by both sides of a connection.
//! - [`server`] is the control-plane half of a bridge, one thread per
//!   application.
//! - [`router`] moves signals from originating applications to steered ones
//!   inside the control plane.

pub mod relay;
pub mod router;
pub mod server;

pub use relay::{listener, run_relay, sender, RelayEndpoint};
pub use router::Router;
pub use server::{BridgeExit, ControlBridge};
