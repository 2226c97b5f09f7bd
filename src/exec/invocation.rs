// src/exec/invocation.rs

//! Building the parallel-launch command line for an application.

use std::path::PathBuf;

use crate::config::AppDefinition;
use crate::types::LauncherKind;

/// Wrapper used when profiling is enabled.
pub const PROFILER: &str = "tau_exec";

/// A fully resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Wrap the application's executable in the configured launcher.
    ///
    /// - `srun -n <nprocs> -N <nodes> --ntasks-per-node=<ppn>
    ///   --cpus-per-task=<cpus> [--gpus-per-task=<g>] [tau_exec] exe args..`
    /// - `mpirun -np <nprocs> [tau_exec] exe args..`
    /// - `direct`: `[tau_exec] exe args..`
    pub fn build(app: &AppDefinition, launcher: LauncherKind) -> Self {
        let mut argv: Vec<String> = Vec::new();

        match launcher {
            LauncherKind::Srun => {
                argv.push("srun".to_string());
                argv.push("-n".to_string());
                argv.push(app.nprocs.to_string());
                argv.push("-N".to_string());
                argv.push(app.num_nodes.to_string());
                argv.push(format!("--ntasks-per-node={}", app.ppn));
                argv.push(format!("--cpus-per-task={}", app.cpus_per_task));
                if let Some(gpus) = app.gpus_per_task {
                    argv.push(format!("--gpus-per-task={gpus}"));
                }
            }
            LauncherKind::Mpirun => {
                argv.push("mpirun".to_string());
                argv.push("-np".to_string());
                argv.push(app.nprocs.to_string());
            }
            LauncherKind::Direct => {}
        }

        if app.tau_profiling {
            argv.push(PROFILER.to_string());
        }
        argv.push(app.exe.clone());
        argv.extend(app.args.iter().cloned());

        let mut env = Vec::new();
        if app.tau_profiling {
            env.push(("TAU_PROFILE".to_string(), "1".to_string()));
            env.push((
                "PROFILE_DIR".to_string(),
                app.working_dir.join("tau-profile").display().to_string(),
            ));
        }

        let program = argv.remove(0);
        Self {
            program,
            args: argv,
            env,
            working_dir: app.working_dir.clone(),
        }
    }

    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Human-readable command line, for logs and `--dry-run`.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
