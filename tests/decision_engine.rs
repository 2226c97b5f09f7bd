// tests/decision_engine.rs

mod common;
use crate::common::init_tracing;

use std::time::Duration;

use steerflow::engine::{
    spawn_decision_engine, Decision, DecisionCore, DecisionEvent, EngineOutcome, EngineState,
    TerminationCause, WorkflowEvent,
};
use steerflow::exec::{ProcessTable, RunningApp};
use steerflow::queue::{queue, TryPop};
use steerflow::wire::ShutdownFlag;
use steerflow_test_utils::builders::AppBuilder;
use steerflow_test_utils::fake_process::{FakeProcess, ProcessCall, ProcessLog, Script};

fn table_with(log: &ProcessLog, apps: &[(&str, Script)]) -> ProcessTable {
    let table = ProcessTable::new();
    for (name, script) in apps {
        let def = AppBuilder::new("true").definition(name);
        let process = Box::new(FakeProcess::new(name, *script, log));
        table
            .insert(RunningApp::new(def, process, ShutdownFlag::new(), Vec::new()))
            .unwrap();
    }
    table
}

#[test]
fn first_event_decides_and_the_rest_are_ignored() {
    let mut core = DecisionCore::new();
    assert_eq!(core.state(), EngineState::Idle);

    let decision = core.step(DecisionEvent::HeartbeatNotDetected {
        app: "simulation".to_string(),
    });
    assert_eq!(
        decision,
        Decision::Terminate(TerminationCause::HeartbeatNotDetected {
            app: "simulation".to_string()
        })
    );
    assert_eq!(core.state(), EngineState::Terminating);

    assert_eq!(core.step(DecisionEvent::ShutdownRequested), Decision::Ignore);
    assert_eq!(core.step(DecisionEvent::Quit), Decision::Ignore);
}

#[test]
fn quit_stops_without_terminating() {
    let mut core = DecisionCore::new();
    assert_eq!(core.step(DecisionEvent::Quit), Decision::Quit);
    assert_eq!(core.state(), EngineState::Stopped);
    assert_eq!(
        core.step(DecisionEvent::HeartbeatNotDetected {
            app: "late".to_string()
        }),
        Decision::Ignore
    );
}

#[test]
fn interrupt_terminates_with_its_own_cause() {
    let mut core = DecisionCore::new();
    assert_eq!(
        core.step(DecisionEvent::ShutdownRequested),
        Decision::Terminate(TerminationCause::Interrupted)
    );
}

#[test]
fn heartbeat_failure_terminates_every_process_once() {
    init_tracing();
    let log = ProcessLog::new();
    let table = table_with(
        &log,
        &[
            ("simulation", Script::ExitsOnTerminate),
            ("analysis", Script::ExitsOnTerminate),
        ],
    );
    let (decisions_tx, decisions_rx) = queue();
    let (events_tx, mut events_rx) = queue();

    let engine = spawn_decision_engine(
        decisions_rx,
        table.clone(),
        Duration::from_millis(50),
        events_tx,
    )
    .unwrap();

    decisions_tx
        .push(DecisionEvent::HeartbeatNotDetected {
            app: "simulation".to_string(),
        })
        .unwrap();
    // A second failure is never acted on, whether or not the engine is
    // still there to receive it.
    let _ = decisions_tx.push(DecisionEvent::HeartbeatNotDetected {
        app: "analysis".to_string(),
    });

    let cause = TerminationCause::HeartbeatNotDetected {
        app: "simulation".to_string(),
    };
    match engine.join().unwrap() {
        EngineOutcome::Terminated { cause: c, report } => {
            assert_eq!(c, cause);
            assert_eq!(report.signalled.len(), 2);
            assert!(report.killed.is_empty());
        }
        other => panic!("expected termination, got {other:?}"),
    }

    assert_eq!(events_rx.try_pop(), TryPop::Item(WorkflowEvent::Terminated { cause }));
    assert_eq!(log.count("simulation", ProcessCall::Terminate), 1);
    assert_eq!(log.count("analysis", ProcessCall::Terminate), 1);
    assert!(table.is_closed());
}

#[test]
fn quit_leaves_processes_alone() {
    let log = ProcessLog::new();
    let table = table_with(&log, &[("simulation", Script::IgnoresTerminate)]);
    let (decisions_tx, decisions_rx) = queue();
    let (events_tx, mut events_rx) = queue();

    let engine =
        spawn_decision_engine(decisions_rx, table.clone(), Duration::ZERO, events_tx).unwrap();
    decisions_tx.push(DecisionEvent::Quit).unwrap();

    assert_eq!(engine.join().unwrap(), EngineOutcome::Quit);
    assert!(log.calls().is_empty());
    assert!(!table.is_closed());
    assert_eq!(events_rx.try_pop(), TryPop::Closed);
}

#[test]
fn engine_exits_when_nobody_can_reach_it() {
    let (decisions_tx, decisions_rx) = queue::<DecisionEvent>();
    let (events_tx, _events_rx) = queue();
    let engine =
        spawn_decision_engine(decisions_rx, ProcessTable::new(), Duration::ZERO, events_tx).unwrap();
    drop(decisions_tx);
    assert_eq!(engine.join().unwrap(), EngineOutcome::Disconnected);
}
