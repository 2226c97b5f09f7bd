// src/heartbeat/emitter.rs

use std::io;
use std::net::{Shutdown, TcpStream};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::heartbeat::Pulse;
use crate::queue::{queue, QueueReceiver, QueueSender};
use crate::wire::{self, Connection, RendezvousAddr};

/// Requests from the application's main loop to its emitter thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatCommand {
    Beat,
    /// Say farewell and exit.
    Stop,
}

/// Application side of the heartbeat channel.
///
/// If the command queue is dropped without `Stop`, the emitter closes the
/// connection without a farewell, which the monitor treats as a failure.
#[derive(Debug)]
pub struct HeartbeatEmitter {
    tx: Option<QueueSender<HeartbeatCommand>>,
    socket: TcpStream,
    thread: Option<JoinHandle<()>>,
}

impl HeartbeatEmitter {
    /// Connect to the monitor at `addr` and start forwarding heartbeats.
    pub fn start(app: &str, addr: &RendezvousAddr) -> Result<Self> {
        let conn = wire::connect_and_announce(&format!("{app}/heartbeat"), addr)?;
        let socket = conn.shutdown_handle()?;
        let (tx, rx) = queue::<HeartbeatCommand>();

        let app_name = app.to_string();
        let thread = thread::Builder::new()
            .name(format!("heartbeat-{app}"))
            .spawn(move || forward(&app_name, rx, conn))?;

        info!(app, %addr, "heartbeat thread started");
        Ok(Self {
            tx: Some(tx),
            socket,
            thread: Some(thread),
        })
    }

    pub fn beat(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.push(HeartbeatCommand::Beat);
        }
    }

    /// Send the farewell and wait for the thread.
    pub fn stop(mut self) -> io::Result<()> {
        if let Some(tx) = self.tx.take() {
            let _ = tx.push(HeartbeatCommand::Stop);
        }
        self.join()
    }

    fn join(&mut self) -> io::Result<()> {
        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| io::Error::other("heartbeat thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for HeartbeatEmitter {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.tx.take();
            let _ = self.socket.shutdown(Shutdown::Both);
        }
    }
}

fn forward(app: &str, mut rx: QueueReceiver<HeartbeatCommand>, mut conn: Connection) {
    let mut beats: u64 = 0;
    loop {
        let pulse = match rx.pop() {
            Some(HeartbeatCommand::Beat) => {
                beats += 1;
                Pulse::Beat(beats)
            }
            Some(HeartbeatCommand::Stop) => Pulse::Farewell,
            None => {
                debug!(app, "heartbeat queue dropped; closing without farewell");
                conn.close();
                return;
            }
        };

        debug!(app, ?pulse, "forwarding heartbeat");
        if let Err(e) = conn.send(&pulse) {
            warn!(app, error = %e, "heartbeat connection lost");
            return;
        }
        if pulse == Pulse::Farewell {
            conn.close();
            return;
        }
    }
}
