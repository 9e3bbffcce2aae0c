//! Shutdown verification
//!
//! After the application under test has been asked to exit, the verifier
//! waits for the process to disappear and then for the application's settings
//! to be flushed, so the sandbox is never deleted underneath a live process.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use autsandbox_common::config::ShutdownConfig;

use crate::poll::{wait_until, WaitOutcome};
use crate::process::ProcessProbe;

/// Where the verifier is in the shutdown sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    Running,
    WaitingProcessDeath,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// No process to wait for (sentinel pid)
    NoProcess,
    /// The process was observed gone
    Exited,
    /// The process was still reported alive at the deadline
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushOutcome {
    /// The settings file's mtime moved past the baseline
    Flushed,
    /// The mtime did not change before the deadline
    TimedOut,
    /// No baseline could be captured, so there was nothing to compare
    NoBaseline,
}

/// Modification time of the settings file before shutdown was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsBaseline {
    path: PathBuf,
    mtime: Option<SystemTime>,
}

impl SettingsBaseline {
    pub fn capture(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mtime = modified_time(&path);
        if mtime.is_none() {
            warn!(
                "Cannot read modification time of {}; settings flush will not be verified",
                path.display()
            );
        }
        Self { path, mtime }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    /// Whether the file has been written since the baseline was taken
    pub fn advanced(&self) -> bool {
        match (self.mtime, modified_time(&self.path)) {
            (Some(before), Some(now)) => now > before,
            _ => false,
        }
    }
}

pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Result of waiting for the application process
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    pub pid: i64,
    pub outcome: ProcessOutcome,
    pub waited_ms: u64,
    pub polls: u32,
}

/// Polls process liveness and the settings mtime with bounded waits
#[derive(Debug, Clone)]
pub struct ShutdownVerifier {
    config: ShutdownConfig,
    state: ShutdownState,
}

impl ShutdownVerifier {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            state: ShutdownState::Running,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state
    }

    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }

    /// Wait until `probe` reports the process gone or the process timeout
    /// elapses. Never fails; a timeout is logged and the caller carries on.
    pub fn wait_for_process_death(&mut self, probe: &mut dyn ProcessProbe) -> ShutdownReport {
        let pid = probe.pid();
        self.state = ShutdownState::WaitingProcessDeath;

        if pid < 0 {
            debug!("No application process to wait for");
            self.state = ShutdownState::Confirmed;
            return ShutdownReport {
                pid,
                outcome: ProcessOutcome::NoProcess,
                waited_ms: 0,
                polls: 0,
            };
        }

        debug!("Waiting for application (pid {}) to exit", pid);
        let wait = wait_until(
            self.config.process_timeout(),
            self.config.poll_interval(),
            || !probe.is_alive(),
        );

        let outcome = match wait {
            WaitOutcome::Satisfied { .. } => {
                self.state = ShutdownState::Confirmed;
                info!("Application (pid {}) has shut down", pid);
                ProcessOutcome::Exited
            }
            WaitOutcome::TimedOut { elapsed, .. } => {
                warn!(
                    "Application (pid {}) still alive after {:?}; continuing anyway",
                    pid, elapsed
                );
                ProcessOutcome::TimedOut
            }
        };

        let (elapsed, polls) = match wait {
            WaitOutcome::Satisfied { elapsed, attempts }
            | WaitOutcome::TimedOut { elapsed, attempts } => (elapsed, attempts),
        };

        ShutdownReport {
            pid,
            outcome,
            waited_ms: millis(elapsed),
            polls,
        }
    }

    /// Wait for the settings file to be rewritten after exit
    pub fn wait_for_settings_flush(&self, baseline: &SettingsBaseline) -> FlushOutcome {
        if baseline.mtime().is_none() {
            return FlushOutcome::NoBaseline;
        }

        let wait = wait_until(
            self.config.settings_flush_timeout(),
            self.config.poll_interval(),
            || baseline.advanced(),
        );

        if wait.is_satisfied() {
            debug!("{} was written on shutdown", baseline.path().display());
            FlushOutcome::Flushed
        } else {
            info!(
                "{} unchanged after {:?}",
                baseline.path().display(),
                wait.elapsed()
            );
            FlushOutcome::TimedOut
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
