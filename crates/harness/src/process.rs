//! Liveness probes for the application under test

use std::process::Child;
use tracing::{debug, warn};

/// Pid reported for an application context that has no process
pub const NO_PROCESS: i64 = -1;

/// A process whose exit the harness waits for
pub trait ProcessProbe {
    /// OS process identifier; negative when there is no process
    fn pid(&self) -> i64;

    /// Whether the process still exists
    fn is_alive(&mut self) -> bool;
}

impl<P: ProcessProbe + ?Sized> ProcessProbe for Box<P> {
    fn pid(&self) -> i64 {
        (**self).pid()
    }

    fn is_alive(&mut self) -> bool {
        (**self).is_alive()
    }
}

/// A process known only by its pid, e.g. one launched by another tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsProcess {
    pid: i64,
}

impl OsProcess {
    pub fn new(pid: i64) -> Self {
        Self { pid }
    }
}

impl ProcessProbe for OsProcess {
    fn pid(&self) -> i64 {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        if self.pid < 0 {
            return false;
        }
        pid_is_alive(self.pid)
    }
}

/// Signal-0 probe. `ESRCH` and `EPERM` both count as gone; the latter may mean
/// the pid now belongs to another user's process.
#[cfg(unix)]
pub fn pid_is_alive(pid: i64) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    match kill(Pid::from_raw(raw), None::<Signal>) {
        Ok(()) => true,
        Err(Errno::ESRCH) | Err(Errno::EPERM) => false,
        Err(e) => {
            debug!("Liveness probe for pid {} failed: {}", pid, e);
            true
        }
    }
}

/// Enumeration probe: the process is gone once it is missing from the OS
/// process list.
#[cfg(not(unix))]
pub fn pid_is_alive(pid: i64) -> bool {
    use sysinfo::{Pid, ProcessStatus, System};

    let Ok(raw) = u32::try_from(pid) else {
        return false;
    };

    let mut system = System::new_all();
    system.refresh_all();
    match system.process(Pid::from_u32(raw)) {
        Some(process) => !matches!(
            process.status(),
            ProcessStatus::Zombie | ProcessStatus::Dead
        ),
        None => false,
    }
}

/// A child spawned by the harness itself; exit is observed with `try_wait`,
/// which also reaps it.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    exited: bool,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            exited: false,
        }
    }

    /// Block until the child exits
    pub fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        let status = self.child.wait()?;
        self.exited = true;
        Ok(status)
    }

    /// Kill the child if it is still running
    pub fn kill(&mut self) {
        if self.exited {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!("Failed to kill pid {}: {}", self.child.id(), e);
        }
        let _ = self.child.wait();
        self.exited = true;
    }
}

impl ProcessProbe for ChildProcess {
    fn pid(&self) -> i64 {
        i64::from(self.child.id())
    }

    fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("Application (pid {}) exited with {}", self.child.id(), status);
                self.exited = true;
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("try_wait on pid {} failed: {}", self.child.id(), e);
                pid_is_alive(self.pid())
            }
        }
    }
}
