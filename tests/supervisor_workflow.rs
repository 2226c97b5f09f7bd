// tests/supervisor_workflow.rs

mod common;
use crate::common::{init_tracing, TestResult};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use steerflow::api::{CheckOutcome, ControlContext, SignalHandlers};
use steerflow::engine::{DecisionEvent, TerminationCause};
use steerflow::errors::SteerError;
use steerflow::exec::ExitState;
use steerflow::supervisor::{Supervisor, WorkflowOutcome};
use steerflow::wire;
use steerflow_test_utils::builders::{AppBuilder, WorkflowBuilder};
use steerflow_test_utils::fake_process::{AppHarness, ProcessCall, ThreadSpawner};

/// A steered application: polls for control until told to stop, counting
/// `TOGGLE_IO` requests. Never beats.
fn simulation(toggles: Arc<AtomicUsize>) -> impl Fn(AppHarness) -> i32 + Send + Sync + 'static {
    move |harness| {
        let Ok(identity) = harness.identity() else {
            return 2;
        };
        let Ok(mut ctx) = ControlContext::init_without_callbacks(identity) else {
            return 2;
        };
        let counter = Arc::clone(&toggles);
        let mut handlers = SignalHandlers::new().on("TOGGLE_IO", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        let code = loop {
            if harness.terminate_requested() || Instant::now() >= deadline {
                break 1;
            }
            match ctx.check(&(), &(), &mut handlers) {
                Ok(CheckOutcome::Terminate) => break 0,
                Ok(CheckOutcome::Continue) => thread::sleep(Duration::from_millis(10)),
                Err(_) => break 3,
            }
        };
        let _ = ctx.finalize();
        code
    }
}

/// A watchdog application that sends `symbols` and finishes.
fn analysis(symbols: &'static [&'static str]) -> impl Fn(AppHarness) -> i32 + Send + Sync + 'static {
    delayed_analysis(Duration::ZERO, symbols)
}

/// Like [`analysis`], but connects and then waits `delay` before sending.
fn delayed_analysis(
    delay: Duration,
    symbols: &'static [&'static str],
) -> impl Fn(AppHarness) -> i32 + Send + Sync + 'static {
    move |harness| {
        let Ok(identity) = harness.identity() else {
            return 2;
        };
        let Ok(mut ctx) = ControlContext::init_without_callbacks(identity) else {
            return 2;
        };
        thread::sleep(delay);
        for symbol in symbols {
            if ctx.signal(*symbol).is_err() {
                return 3;
            }
        }
        match ctx.finalize() {
            Ok(()) => 0,
            Err(_) => 3,
        }
    }
}

#[test]
fn analysis_steers_the_simulation_to_a_clean_finish() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let toggles = Arc::new(AtomicUsize::new(0));

    let config = WorkflowBuilder::new(dir.path())
        .with_app("simulation", AppBuilder::listener().build())
        .with_app("analysis", AppBuilder::sender().build())
        .build();
    let spawner = ThreadSpawner::new()
        .with_app("simulation", simulation(Arc::clone(&toggles)))
        .with_app("analysis", analysis(&["TOGGLE_IO", "SIGTERM"]));

    let supervisor = Supervisor::new(config, spawner)?;
    let table = supervisor.process_table().clone();
    let outcome = supervisor.run()?;

    assert_eq!(outcome, WorkflowOutcome::Completed);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(toggles.load(Ordering::SeqCst), 1);
    assert_eq!(table.exit_state("simulation"), Some(ExitState::Exited(Some(0))));
    assert_eq!(table.exit_state("analysis"), Some(ExitState::Exited(Some(0))));
    assert!(!wire::conn_info_path(dir.path(), "simulation").exists());
    assert!(!wire::conn_info_path(dir.path(), "analysis").exists());
    Ok(())
}

#[test]
fn finished_sender_does_not_cut_off_the_others() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let config = WorkflowBuilder::new(dir.path())
        .with_app("simulation", AppBuilder::listener().build())
        .with_app("quick", AppBuilder::sender().build())
        .with_app("watchdog", AppBuilder::sender().build())
        .build();
    let spawner = ThreadSpawner::new()
        .with_app("simulation", simulation(Arc::default()))
        .with_app("quick", analysis(&[]))
        .with_app("watchdog", delayed_analysis(Duration::from_millis(500), &["SIGTERM"]));

    let supervisor = Supervisor::new(config, spawner)?;
    let table = supervisor.process_table().clone();
    let started = Instant::now();
    let outcome = supervisor.run()?;

    assert_eq!(outcome, WorkflowOutcome::Completed);
    // Exit code 0 means the watchdog's SIGTERM reached the simulation
    // rather than the simulation running into its own deadline.
    assert_eq!(table.exit_state("simulation"), Some(ExitState::Exited(Some(0))));
    assert_eq!(table.exit_state("quick"), Some(ExitState::Exited(Some(0))));
    assert_eq!(table.exit_state("watchdog"), Some(ExitState::Exited(Some(0))));
    assert!(started.elapsed() < Duration::from_secs(8));
    Ok(())
}

#[test]
fn trigger_symbol_launches_the_on_demand_app() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let config = WorkflowBuilder::new(dir.path())
        .with_app("analysis", AppBuilder::sender().build())
        .with_app(
            "external",
            AppBuilder::new("in-process").launch_on("LAUNCH_EXTERNAL").build(),
        )
        .build();
    let spawner = ThreadSpawner::new()
        .with_app("analysis", analysis(&["LAUNCH_EXTERNAL"]))
        .with_app("external", |_| 0);
    let log = spawner.log();

    let outcome = Supervisor::new(config, spawner)?.run()?;

    assert_eq!(outcome, WorkflowOutcome::Completed);
    assert_eq!(log.count("analysis", ProcessCall::Spawn), 1);
    assert_eq!(log.count("external", ProcessCall::Spawn), 1);
    Ok(())
}

#[test]
fn silent_heartbeat_terminates_the_whole_workflow() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let config = WorkflowBuilder::new(dir.path())
        .with_app("simulation", AppBuilder::listener().heartbeat(0.5).build())
        .build();
    let spawner = ThreadSpawner::new().with_app("simulation", simulation(Arc::default()));
    let log = spawner.log();

    let started = Instant::now();
    let outcome = Supervisor::new(config, spawner)?.run()?;

    assert_eq!(
        outcome,
        WorkflowOutcome::Terminated {
            cause: TerminationCause::HeartbeatNotDetected {
                app: "simulation".to_string()
            }
        }
    );
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(log.count("simulation", ProcessCall::Terminate), 1);
    assert!(started.elapsed() < Duration::from_secs(8));
    Ok(())
}

#[test]
fn one_failed_launch_does_not_stop_the_others() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    // `ghost` has no registered main, so spawning it fails.
    let config = WorkflowBuilder::new(dir.path())
        .with_app("analysis", AppBuilder::sender().build())
        .with_app("ghost", AppBuilder::sender().build())
        .build();
    let spawner = ThreadSpawner::new().with_app("analysis", analysis(&["PING"]));
    let log = spawner.log();

    let supervisor = Supervisor::new(config, spawner)?;
    let table = supervisor.process_table().clone();
    let outcome = supervisor.run()?;

    assert_eq!(outcome, WorkflowOutcome::Completed);
    assert_eq!(table.names(), ["analysis"]);
    assert_eq!(log.count("ghost", ProcessCall::Spawn), 0);
    assert!(!wire::conn_info_path(dir.path(), "ghost").exists());
    Ok(())
}

#[test]
fn nothing_to_start_is_an_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = WorkflowBuilder::new(dir.path())
        .with_app("ghost", AppBuilder::new("in-process").build())
        .build();

    let result = Supervisor::new(config, ThreadSpawner::new())?.run();
    assert!(matches!(result, Err(SteerError::Launch { .. })));
    Ok(())
}

#[test]
fn operator_interrupt_tears_the_workflow_down() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let config = WorkflowBuilder::new(dir.path())
        .with_app("simulation", AppBuilder::listener().build())
        .build();
    let spawner = ThreadSpawner::new().with_app("simulation", simulation(Arc::default()));
    let log = spawner.log();

    let supervisor = Supervisor::new(config, spawner)?;
    supervisor
        .decision_sender()
        .push(DecisionEvent::ShutdownRequested)
        .unwrap();
    let outcome = supervisor.run()?;

    assert_eq!(
        outcome,
        WorkflowOutcome::Terminated {
            cause: TerminationCause::Interrupted
        }
    );
    assert_eq!(outcome.to_string(), "terminated (interrupted by operator)");
    assert_eq!(log.count("simulation", ProcessCall::Terminate), 1);
    Ok(())
}

#[test]
fn missing_conn_dir_is_created() -> TestResult {
    let dir = tempfile::tempdir()?;
    let nested = dir.path().join("run").join("conn");
    let config = WorkflowBuilder::new(&nested)
        .with_app("solo", AppBuilder::new("in-process").build())
        .build();

    let supervisor = Supervisor::new(config, ThreadSpawner::new())?;
    assert!(nested.is_dir());
    assert!(supervisor.conn_dir().is_absolute());
    Ok(())
}
