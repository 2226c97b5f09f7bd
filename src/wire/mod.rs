// src/wire/mod.rs

//! Point-to-point connections between application and control plane.
//!
//! - [`codec`] frames one JSON value per line over a TCP stream.
//! - [`rendezvous`] publishes and discovers `<app>.conn_info` files.
//! - [`listen`] accepts connections and performs the `READY` handshake.

pub mod codec;
pub mod listen;
pub mod rendezvous;

pub use codec::{Connection, ConnectionState};
pub use listen::{
    accept_until, connect_and_announce, expect_ready, AcceptAbort, ShutdownFlag,
};
pub use rendezvous::{conn_info_path, discover, publish, retract, RendezvousAddr};
