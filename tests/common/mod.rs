#![allow(dead_code)]

use std::error::Error;
use std::net::TcpListener;
use std::path::Path;
use std::thread::{self, JoinHandle};

use steerflow::bridge::{ControlBridge, RelayEndpoint};
use steerflow::engine::WorkflowEvent;
use steerflow::queue::{queue, QueueReceiver};
use steerflow::types::BridgeRole;
use steerflow::wire::{self, Connection, RendezvousAddr, ShutdownFlag};

pub use steerflow_test_utils::{init_tracing, wait_for};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Loopback listener on an OS-assigned port, plus its address.
pub fn loopback() -> (TcpListener, RendezvousAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    (listener, RendezvousAddr::new("127.0.0.1", port))
}

/// A handshaken (control-plane side, application side) connection pair.
pub fn connected_pair(peer: &str) -> (Connection, Connection) {
    let (listener, addr) = loopback();
    let app_peer = peer.to_string();
    let app = thread::spawn(move || wire::connect_and_announce(&app_peer, &addr));

    let (stream, _) = listener.accept().expect("accept");
    let mut control = Connection::new(peer, stream).expect("wrap stream");
    wire::expect_ready(&mut control).expect("handshake");
    let app = app.join().expect("connect thread").expect("connect");
    (control, app)
}

/// A control-plane bridge for `app`, with its rendezvous file in `dir`.
pub struct BridgeFixture {
    pub addr: RendezvousAddr,
    pub events: QueueReceiver<WorkflowEvent>,
    pub shutdown: ShutdownFlag,
    pub handle: JoinHandle<()>,
}

impl BridgeFixture {
    /// Wait for the bridge thread and return what it reported.
    pub fn finish(mut self) -> WorkflowEvent {
        self.handle.join().expect("bridge thread panicked");
        self.events.pop().expect("bridge reported nothing")
    }
}

pub fn spawn_control_bridge(
    dir: &Path,
    app: &str,
    role: BridgeRole,
    endpoint: RelayEndpoint,
) -> BridgeFixture {
    let (listener, addr) = loopback();
    wire::publish(dir, app, &addr).expect("publish conn_info");

    let (events_tx, events) = queue();
    let shutdown = ShutdownFlag::new();
    let handle = ControlBridge {
        app: app.to_string(),
        role,
        listener,
        endpoint,
        conn_dir: dir.to_path_buf(),
        shutdown: shutdown.clone(),
    }
    .spawn(events_tx)
    .expect("spawn bridge");

    BridgeFixture {
        addr,
        events,
        shutdown,
        handle,
    }
}
