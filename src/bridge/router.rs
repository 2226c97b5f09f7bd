// src/bridge/router.rs

//! Fans signals from originating applications out to steered ones.
//!
//! Sender-role bridges push into a single control-plane inbox. The router
//! is its only consumer: each signal is forwarded, in order, to the queue of
//! every listener-role bridge. An extension signal that names an on-demand
//! application is consumed here and turned into a launch request instead.
//!
//! A `DONE` from one sender only means that sender has finished, so it is
//! not forwarded. The router ends when the inbox closes (every sender gone),
//! which drops the listener queues so their bridges wind down with `DONE`.

use std::collections::HashMap;
use std::io;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::engine::WorkflowEvent;
use crate::queue::{QueueReceiver, QueueSender};
use crate::signal::Signal;

#[derive(Debug)]
pub struct Router {
    inbox: QueueReceiver<Signal>,
    outlets: Vec<(String, QueueSender<Signal>)>,
    on_demand: HashMap<Signal, String>,
    events: QueueSender<WorkflowEvent>,
}

impl Router {
    pub fn new(inbox: QueueReceiver<Signal>, events: QueueSender<WorkflowEvent>) -> Self {
        Self {
            inbox,
            outlets: Vec::new(),
            on_demand: HashMap::new(),
            events,
        }
    }

    /// Register the queue feeding a listener-role bridge.
    pub fn add_outlet(&mut self, app: impl Into<String>, tx: QueueSender<Signal>) {
        self.outlets.push((app.into(), tx));
    }

    /// Launch `app` the first time `trigger` is relayed.
    pub fn add_on_demand(&mut self, trigger: Signal, app: impl Into<String>) {
        self.on_demand.insert(trigger, app.into());
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("signal-router".to_string())
            .spawn(move || self.run())
    }

    /// Route until the inbox closes.
    pub fn run(mut self) {
        info!(outlets = self.outlets.len(), "signal router started");

        while let Some(signal) = self.inbox.pop() {
            if signal == Signal::Done {
                debug!("a sender finished; DONE not forwarded");
                continue;
            }

            if let Some(app) = self.on_demand.remove(&signal) {
                info!(%signal, app = %app, "signal requests on-demand launch");
                if self.events.push(WorkflowEvent::LaunchRequested { app }).is_err() {
                    warn!(%signal, "supervisor gone; launch request dropped");
                }
                continue;
            }

            for (app, tx) in &self.outlets {
                debug!(%signal, app = %app, "routing signal");
                if tx.push(signal.clone()).is_err() {
                    debug!(%signal, app = %app, "bridge already finished; not routed");
                }
            }
        }

        info!("signal router finished (inbox closed)");
    }
}
