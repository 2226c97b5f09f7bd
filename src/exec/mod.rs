// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`invocation`] turns an `AppDefinition` into a launcher command line.
//! - [`process`] defines the `ManagedProcess` handle and its OS version.
//! - [`backend`] provides the `ProcessSpawner` trait and the production
//!   `OsSpawner`; tests can substitute their own spawner.
//! - [`table`] owns every `RunningApp` and implements the graceful-then-
//!   forced `terminate_workflow` escalation.

pub mod backend;
pub mod invocation;
pub mod process;
pub mod table;

pub use backend::{OsSpawner, ProcessSpawner};
pub use invocation::Invocation;
pub use process::{ExitState, ManagedProcess, OsProcess};
pub use table::{ProcessTable, RunningApp, TerminationReport, DEFAULT_GRACE_PERIOD};
