// src/config/validate.rs

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::config::model::{
    AppConfig, AppDefinition, HeartbeatPolicy, RawWorkflowConfig, WorkflowConfig,
    WorkflowSettings,
};
use crate::errors::{Result, SteerError};
use crate::signal::Signal;

/// Names end up in file names (`<app>.conn_info`), thread names and env vars.
const APP_NAME_PATTERN: &str = r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$";

/// Extension symbols travel as single wire tokens.
const SYMBOL_PATTERN: &str = r"^[A-Za-z0-9_][A-Za-z0-9_.:-]*$";

impl TryFrom<RawWorkflowConfig> for WorkflowConfig {
    type Error = SteerError;

    fn try_from(raw: RawWorkflowConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        let settings = WorkflowSettings {
            conn_dir: raw.workflow.conn_dir,
            bind_host: raw.workflow.bind_host,
            base_port: raw.workflow.base_port,
            grace_period: seconds("[workflow].grace_period_secs", raw.workflow.grace_period_secs)?,
            launcher: raw.workflow.launcher,
        };
        let apps = raw
            .app
            .into_iter()
            .map(|(name, app)| to_definition(name, app))
            .collect::<Result<Vec<_>>>()?;

        Ok(WorkflowConfig::new_unchecked(settings, apps))
    }
}

fn validate_raw_config(cfg: &RawWorkflowConfig) -> Result<()> {
    ensure_has_apps(cfg)?;
    validate_workflow_section(cfg)?;

    let name_re = compile(APP_NAME_PATTERN)?;
    let symbol_re = compile(SYMBOL_PATTERN)?;
    for (name, app) in cfg.app.iter() {
        validate_app(name, app, &name_re, &symbol_re)?;
    }

    validate_launch_triggers(cfg)?;
    Ok(())
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| SteerError::Config(format!("bad pattern {pattern}: {e}")))
}

fn ensure_has_apps(cfg: &RawWorkflowConfig) -> Result<()> {
    if cfg.app.is_empty() {
        return Err(SteerError::Config(
            "workflow must contain at least one [app.<name>] section".to_string(),
        ));
    }
    if cfg.app.values().all(|a| a.launch_on.is_some()) {
        return Err(SteerError::Config(
            "every application is on-demand (`launch_on`); nothing would start".to_string(),
        ));
    }
    Ok(())
}

fn validate_workflow_section(cfg: &RawWorkflowConfig) -> Result<()> {
    let grace = cfg.workflow.grace_period_secs;
    if !grace.is_finite() || grace < 0.0 {
        return Err(SteerError::Config(format!(
            "[workflow].grace_period_secs must be >= 0 (got {grace})"
        )));
    }
    if cfg.workflow.bind_host.trim().is_empty() {
        return Err(SteerError::Config(
            "[workflow].bind_host must not be empty".to_string(),
        ));
    }
    if cfg.workflow.base_port == u16::MAX {
        return Err(SteerError::Config(
            "[workflow].base_port leaves no room for the heartbeat port".to_string(),
        ));
    }
    Ok(())
}

fn validate_app(name: &str, app: &AppConfig, name_re: &Regex, symbol_re: &Regex) -> Result<()> {
    if !name_re.is_match(name) {
        return Err(SteerError::Config(format!(
            "invalid application name '{name}' (letters, digits, '_', '.', '-')"
        )));
    }
    if app.exe.trim().is_empty() {
        return Err(SteerError::Config(format!("app '{name}' has an empty `exe`")));
    }

    for (field, value) in [
        ("nprocs", Some(app.nprocs)),
        ("num_nodes", Some(app.num_nodes)),
        ("cpus_per_task", Some(app.cpus_per_task)),
        ("ppn", app.ppn),
    ] {
        if value == Some(0) {
            return Err(SteerError::Config(format!(
                "app '{name}': `{field}` must be >= 1"
            )));
        }
    }

    if app.heartbeat {
        if app.role.is_none() {
            return Err(SteerError::Config(format!(
                "app '{name}': heartbeats need a bridge `role`"
            )));
        }
        match app.heart_rate {
            Some(rate) if rate.is_finite() && rate > 0.0 => {}
            Some(rate) => {
                return Err(SteerError::Config(format!(
                    "app '{name}': `heart_rate` must be > 0 seconds (got {rate})"
                )));
            }
            None => {
                return Err(SteerError::Config(format!(
                    "app '{name}': `heartbeat = true` requires `heart_rate`"
                )));
            }
        }
    }

    if let Some(symbol) = &app.launch_on {
        if app.role.is_some() || app.heartbeat {
            return Err(SteerError::Config(format!(
                "app '{name}': on-demand apps (`launch_on`) cannot have a `role` or heartbeat"
            )));
        }
        if !symbol_re.is_match(symbol) {
            return Err(SteerError::Config(format!(
                "app '{name}': invalid `launch_on` symbol '{symbol}'"
            )));
        }
        if !Signal::custom(symbol.as_str()).is_extension() {
            return Err(SteerError::Config(format!(
                "app '{name}': `launch_on` cannot use the built-in signal {symbol}"
            )));
        }
    }

    Ok(())
}

fn validate_launch_triggers(cfg: &RawWorkflowConfig) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (name, app) in cfg.app.iter() {
        let Some(symbol) = app.launch_on.as_deref() else {
            continue;
        };
        if let Some(other) = seen.insert(symbol, name.as_str()) {
            return Err(SteerError::Config(format!(
                "apps '{other}' and '{name}' are both launched on '{symbol}'"
            )));
        }
    }
    Ok(())
}

/// Seconds from the workflow file as a `Duration`; values too large to
/// represent are a config error.
fn seconds(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| SteerError::Config(format!("{field} = {secs} is out of range: {e}")))
}

fn to_definition(name: String, app: AppConfig) -> Result<AppDefinition> {
    let ppn = app.ppn.unwrap_or_else(|| app.nprocs.div_ceil(app.num_nodes));
    let heartbeat = match (app.heartbeat, app.heart_rate) {
        (true, Some(rate)) => {
            let heart_rate = seconds(&format!("app '{name}': heart_rate"), rate)?;
            if heart_rate.is_zero() {
                return Err(SteerError::Config(format!(
                    "app '{name}': `heart_rate` = {rate} rounds down to zero"
                )));
            }
            HeartbeatPolicy::every(heart_rate)
        }
        _ => HeartbeatPolicy::disabled(),
    };

    Ok(AppDefinition {
        name,
        exe: app.exe,
        args: app.args,
        role: app.role,
        nprocs: app.nprocs,
        ppn,
        num_nodes: app.num_nodes,
        cpus_per_task: app.cpus_per_task,
        gpus_per_task: app.gpus_per_task,
        tau_profiling: app.tau_profiling,
        working_dir: app.working_dir.unwrap_or_else(|| PathBuf::from(".")),
        heartbeat,
        launch_on: app.launch_on.map(Signal::custom),
    })
}
