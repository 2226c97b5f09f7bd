// src/queue.rs

//! Unbounded, thread-safe FIFO queues used at every relay point.
//!
//! These wrap `tokio::sync::mpsc` unbounded channels but are driven from
//! plain OS threads: consumers block with `blocking_recv` or poll with
//! `try_recv`. The receiving half is not `Clone`, which is what keeps each
//! queue single-consumer. Producers may be cloned freely.
//!
//! `pop` must not be called from inside a Tokio runtime.

use tokio::sync::mpsc::{self, error::TryRecvError};

/// Create a new queue, returning its producer and consumer halves.
pub fn queue<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender { tx }, QueueReceiver { rx })
}

#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue a value. Returns it back if the consumer is gone.
    pub fn push(&self, value: T) -> Result<(), T> {
        self.tx.send(value).map_err(|e| e.0)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

/// Result of a non-blocking pop.
#[derive(Debug, PartialEq, Eq)]
pub enum TryPop<T> {
    Item(T),
    Empty,
    /// Empty and every producer has been dropped.
    Closed,
}

impl<T> QueueReceiver<T> {
    /// Block until a value is available. `None` once the queue is empty and
    /// all producers are gone.
    pub fn pop(&mut self) -> Option<T> {
        self.rx.blocking_recv()
    }

    /// Never blocks.
    pub fn try_pop(&mut self) -> TryPop<T> {
        match self.rx.try_recv() {
            Ok(v) => TryPop::Item(v),
            Err(TryRecvError::Empty) => TryPop::Empty,
            Err(TryRecvError::Disconnected) => TryPop::Closed,
        }
    }
}
