// src/engine/core.rs

//! Pure decision state machine.
//!
//! No threads, queues or processes here; the reactor feeds events in and
//! acts on the returned [`Decision`]. The engine fires at most once.

use tracing::debug;

use crate::engine::{DecisionEvent, TerminationCause};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting for its one message.
    Idle,
    /// Decided to tear the workflow down.
    Terminating,
    /// Quit without acting.
    Stopped,
}

/// What the reactor should do after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Terminate(TerminationCause),
    Quit,
    /// The engine already decided; later events are ignored.
    Ignore,
}

#[derive(Debug)]
pub struct DecisionCore {
    state: EngineState,
}

impl Default for DecisionCore {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionCore {
    pub fn new() -> Self {
        Self {
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Consume one event. Only the first event in `Idle` has any effect.
    pub fn step(&mut self, event: DecisionEvent) -> Decision {
        if self.state != EngineState::Idle {
            debug!(?event, state = ?self.state, "engine already decided; ignoring event");
            return Decision::Ignore;
        }

        match event {
            DecisionEvent::HeartbeatNotDetected { app } => {
                self.state = EngineState::Terminating;
                Decision::Terminate(TerminationCause::HeartbeatNotDetected { app })
            }
            DecisionEvent::ShutdownRequested => {
                self.state = EngineState::Terminating;
                Decision::Terminate(TerminationCause::Interrupted)
            }
            DecisionEvent::Quit => {
                self.state = EngineState::Stopped;
                Decision::Quit
            }
        }
    }
}
