// src/exec/process.rs

//! Handles onto launched application processes.

use std::io::{self, ErrorKind};
use std::process::Child;

use tracing::debug;

/// How a process ended, as far as the supervisor can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Exited on its own; `None` when ended by a signal.
    Exited(Option<i32>),
    /// Force-killed by the supervisor.
    Killed,
}

/// A launched process the supervisor can observe and escalate against.
///
/// Production code uses [`OsProcess`]; tests substitute in-process fakes.
pub trait ManagedProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Ask the process to stop (SIGTERM on Unix). Must not fail if the
    /// process already exited.
    fn request_terminate(&mut self) -> io::Result<()>;

    /// `Ok(None)` while the process is alive. Never blocks.
    fn try_exit(&mut self) -> io::Result<Option<ExitState>>;

    /// Kill outright and reap. Must not fail if the process already exited.
    fn force_kill(&mut self) -> io::Result<()>;

    /// Block until the process exits.
    fn wait(&mut self) -> io::Result<ExitState>;
}

#[derive(Debug)]
pub struct OsProcess {
    app: String,
    child: Child,
}

impl OsProcess {
    pub fn new(app: impl Into<String>, child: Child) -> Self {
        Self {
            app: app.into(),
            child,
        }
    }
}

impl ManagedProcess for OsProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    #[cfg(unix)]
    fn request_terminate(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            debug!(app = %self.app, "process already exited; not signalling");
            return Ok(());
        }
        let pid = self.child.id() as libc::pid_t;
        // SAFETY: kill(2) has no memory-safety preconditions, and the pid is
        // our own unreaped child so it cannot have been recycled.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err);
        }
        debug!(app = %self.app, pid, "sent SIGTERM");
        Ok(())
    }

    #[cfg(not(unix))]
    fn request_terminate(&mut self) -> io::Result<()> {
        // No graceful signal available; terminate is the only option.
        self.force_kill()
    }

    fn try_exit(&mut self) -> io::Result<Option<ExitState>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| ExitState::Exited(status.code())))
    }

    fn force_kill(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.child.wait()?;
        debug!(app = %self.app, "process killed and reaped");
        Ok(())
    }

    fn wait(&mut self) -> io::Result<ExitState> {
        let status = self.child.wait()?;
        Ok(ExitState::Exited(status.code()))
    }
}
