// src/engine/reactor.rs

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info};

use crate::engine::core::{Decision, DecisionCore};
use crate::engine::{DecisionEvent, TerminationCause, WorkflowEvent};
use crate::exec::{ProcessTable, TerminationReport};
use crate::queue::{QueueReceiver, QueueSender};

/// How the engine thread ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Quit,
    Terminated {
        cause: TerminationCause,
        report: TerminationReport,
    },
    /// Every producer of the decision queue went away before any message.
    Disconnected,
}

/// Start the single decision engine of a workflow.
///
/// The thread blocks for exactly one message. On a liveness failure or an
/// interrupt it escalates termination of every process in `table`, reports
/// [`WorkflowEvent::Terminated`] on `events`, and exits. On `Quit` it exits
/// without touching anything.
pub fn spawn_decision_engine(
    decisions: QueueReceiver<DecisionEvent>,
    table: ProcessTable,
    grace: Duration,
    events: QueueSender<WorkflowEvent>,
) -> io::Result<JoinHandle<EngineOutcome>> {
    thread::Builder::new()
        .name("decision-engine".to_string())
        .spawn(move || run_engine(decisions, table, grace, events))
}

fn run_engine(
    mut decisions: QueueReceiver<DecisionEvent>,
    table: ProcessTable,
    grace: Duration,
    events: QueueSender<WorkflowEvent>,
) -> EngineOutcome {
    let mut core = DecisionCore::new();
    info!("decision engine waiting");

    let Some(event) = decisions.pop() else {
        info!("decision queue closed; engine exiting");
        return EngineOutcome::Disconnected;
    };

    match core.step(event) {
        Decision::Terminate(cause) => {
            error!(%cause, "decision engine terminating workflow");
            let report = table.terminate_workflow(grace);
            info!(
                signalled = ?report.signalled,
                killed = ?report.killed,
                "all workflow components terminated"
            );
            let _ = events.push(WorkflowEvent::Terminated {
                cause: cause.clone(),
            });
            EngineOutcome::Terminated { cause, report }
        }
        Decision::Quit | Decision::Ignore => {
            info!("decision engine quitting");
            EngineOutcome::Quit
        }
    }
}
