// src/lib.rs

pub mod api;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod heartbeat;
pub mod logging;
pub mod queue;
pub mod signal;
pub mod supervisor;
pub mod types;
pub mod wire;

use anyhow::Result;
use tracing::{debug, error, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, WorkflowConfig};
use crate::engine::DecisionEvent;
use crate::exec::{Invocation, OsSpawner};
use crate::supervisor::Supervisor;

pub use crate::api::{AppIdentity, CheckOutcome, ControlContext, SignalHandlers};
pub use crate::signal::Signal;
pub use crate::supervisor::WorkflowOutcome;

/// High-level entry point used by `main.rs`. Returns the process exit
/// status: 0 when the workflow completed, non-zero when it was terminated.
///
/// The control plane itself runs on plain threads inside
/// `spawn_blocking`; the async runtime only listens for Ctrl-C, which is
/// turned into a shutdown request for the decision engine.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(0);
    }

    let supervisor = Supervisor::new(cfg, OsSpawner)?;

    let interrupt = {
        let decisions = supervisor.decision_sender();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            warn!("interrupt received; terminating workflow");
            let _ = decisions.push(DecisionEvent::ShutdownRequested);
        })
    };

    let outcome = tokio::task::spawn_blocking(move || supervisor.run()).await??;
    interrupt.abort();

    Ok(outcome.exit_code())
}

/// Print every application and the command line it would be launched with.
fn print_dry_run(cfg: &WorkflowConfig) {
    let settings = cfg.settings();
    println!("steerflow dry-run");
    println!("  workflow.conn_dir = {}", settings.conn_dir.display());
    println!("  workflow.bind_host = {}", settings.bind_host);
    println!("  workflow.base_port = {}", settings.base_port);
    println!("  workflow.grace_period = {:?}", settings.grace_period);
    println!("  workflow.launcher = {:?}", settings.launcher);
    println!();

    println!("apps ({}):", cfg.apps().len());
    for app in cfg.apps() {
        let invocation = Invocation::build(app, settings.launcher);
        println!("  - {}", app.name);
        println!("      cmd: {}", invocation.command_line());
        println!("      cwd: {}", invocation.working_dir.display());
        if let Some(role) = app.role {
            println!("      role: {role}");
        }
        if app.heartbeat.enabled {
            println!("      heart_rate: {:?}", app.heartbeat.heart_rate);
        }
        if let Some(trigger) = &app.launch_on {
            println!("      launch_on: {trigger}");
        }
        for (key, value) in &invocation.env {
            println!("      env: {key}={value}");
        }
    }

    debug!("dry-run complete (nothing launched)");
}
