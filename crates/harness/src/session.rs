//! Test session context
//!
//! A [`Session`] owns at most one settings sandbox and at most one attached
//! application process. Dropping the session tears the sandbox down: wait for
//! the application to exit, wait for its settings flush, remove the directory.
//! This runs on every exit path that unwinds, including a panicking test.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

use autsandbox_common::{EnvOverrides, HostPlatform, SandboxConfig};

use crate::error::{HarnessError, HarnessResult};
use crate::launch::LaunchCommand;
use crate::process::{ChildProcess, ProcessProbe};
use crate::provision::{Provisioner, SettingsInstance};
use crate::shutdown::{
    FlushOutcome, SettingsBaseline, ShutdownReport, ShutdownState, ShutdownVerifier,
};

/// What test cases need to know about the provisioned environment
#[derive(Debug, Clone, Serialize)]
pub struct Environment {
    pub platform: HostPlatform,
    /// Appended to every application launch; empty when isolation is off
    pub settings_arg: String,
    pub settings_dir: Option<PathBuf>,
    pub sandbox_root: Option<PathBuf>,
    pub sdk_path: PathBuf,
    pub src_path: PathBuf,
}

/// Summary of a session teardown
#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    pub sandbox_root: Option<PathBuf>,
    pub shutdown: Option<ShutdownReport>,
    pub settings_flush: Option<FlushOutcome>,
    pub removed: bool,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// Explicit per-run context replacing process-global sandbox state
pub struct Session {
    config: SandboxConfig,
    platform: HostPlatform,
    overrides: EnvOverrides,
    instance: Option<SettingsInstance>,
    process: Option<Box<dyn ProcessProbe>>,
    baseline: Option<SettingsBaseline>,
    verifier: ShutdownVerifier,
    last_shutdown: Option<ShutdownReport>,
    finished: bool,
}

impl Session {
    pub fn new(config: SandboxConfig, platform: HostPlatform, overrides: EnvOverrides) -> Self {
        let verifier = ShutdownVerifier::new(config.shutdown.clone());
        Self {
            config,
            platform,
            overrides,
            instance: None,
            process: None,
            baseline: None,
            verifier,
            last_shutdown: None,
            finished: false,
        }
    }

    /// Session for the current host, reading overrides from the environment
    pub fn from_env(config: SandboxConfig) -> Self {
        Self::new(config, HostPlatform::current(), EnvOverrides::from_env())
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn platform(&self) -> HostPlatform {
        self.platform
    }

    pub fn isolation_enabled(&self) -> bool {
        !self.overrides.no_settings_path
    }

    pub fn instance(&self) -> Option<&SettingsInstance> {
        self.instance.as_ref()
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.verifier.state()
    }

    /// Provision the sandbox from the configured template
    pub fn provision_environment(&mut self) -> HarnessResult<Environment> {
        let provisioner = Provisioner::new(self.config.clone(), self.platform);
        self.provision_with(&provisioner)
    }

    /// Provision with an explicitly configured provisioner
    pub fn provision_with(&mut self, provisioner: &Provisioner) -> HarnessResult<Environment> {
        if let Some(existing) = &self.instance {
            return Err(HarnessError::AlreadyProvisioned(existing.root().to_path_buf()));
        }

        if self.isolation_enabled() {
            let template = self.config.template_dir(self.platform);
            let template = std::path::absolute(&template).unwrap_or(template);
            self.instance = Some(provisioner.provision(&template)?);
        } else {
            info!("Settings isolation disabled; using the user's own settings");
        }

        Ok(self.environment())
    }

    /// Take over a sandbox provisioned by an earlier, detached session
    pub fn adopt(&mut self, instance: SettingsInstance) -> HarnessResult<()> {
        if let Some(existing) = &self.instance {
            return Err(HarnessError::AlreadyProvisioned(existing.root().to_path_buf()));
        }
        self.instance = Some(instance);
        Ok(())
    }

    /// Current environment description
    pub fn environment(&self) -> Environment {
        Environment {
            platform: self.platform,
            settings_arg: self.settings_arg(),
            settings_dir: self.instance.as_ref().map(|i| i.settings_dir().to_path_buf()),
            sandbox_root: self.instance.as_ref().map(|i| i.root().to_path_buf()),
            sdk_path: self.platform.default_sdk_path(),
            src_path: self.overrides.src_path(self.platform),
        }
    }

    /// Settings argument string, e.g. ` -settingspath "/tmp/autsandbox-x/settings"`
    pub fn settings_arg(&self) -> String {
        self.instance
            .as_ref()
            .map(|i| i.settings_arg(&self.config.launch.settings_flag))
            .unwrap_or_default()
    }

    /// Build the launch command for the application, settings appended
    pub fn command(&self, launch: &LaunchCommand) -> std::process::Command {
        let launch = launch.clone().for_platform(self.platform, &self.config.launch);
        let settings = self
            .instance
            .as_ref()
            .map(|i| i.settings_args(&self.config.launch.settings_flag));
        launch.to_command(settings.as_ref().map(|s| s.as_slice()))
    }

    /// Spawn the application and attach it as the session's process
    pub fn launch(&mut self, launch: &LaunchCommand) -> HarnessResult<i64> {
        let child = self
            .command(launch)
            .spawn()
            .map_err(|e| HarnessError::Launch {
                program: launch.program.clone(),
                reason: e.to_string(),
            })?;
        let pid = i64::from(child.id());
        info!("Launched {} (pid {})", launch.program, pid);
        self.attach(Box::new(ChildProcess::new(child)))?;
        Ok(pid)
    }

    /// Attach an application process started elsewhere.
    ///
    /// Only one process may be attached at a time; the settings baseline is
    /// captured here, before any shutdown is requested.
    pub fn attach(&mut self, mut probe: Box<dyn ProcessProbe>) -> HarnessResult<()> {
        if let Some(current) = self.process.as_mut() {
            if current.is_alive() {
                return Err(HarnessError::ProcessAlreadyAttached(current.pid()));
            }
        }
        if !probe.is_alive() {
            debug!("Attached process {} is already gone", probe.pid());
        }
        self.capture_baseline();
        self.verifier = ShutdownVerifier::new(self.config.shutdown.clone());
        self.process = Some(probe);
        Ok(())
    }

    /// Record the settings file's current mtime as the flush baseline
    pub fn capture_baseline(&mut self) {
        if let Some(instance) = &self.instance {
            let devices = self.config.layout.devices_path(instance.settings_dir());
            self.baseline = Some(SettingsBaseline::capture(devices));
        }
    }

    /// Wait for an application the caller asked to exit.
    ///
    /// Bounded by the process timeout; never fails.
    pub fn verify_clean_shutdown<P: ProcessProbe>(&mut self, mut probe: P) -> ShutdownReport {
        if self.baseline.is_none() {
            self.capture_baseline();
        }

        let report = self.verifier.wait_for_process_death(&mut probe);
        if self.process.as_ref().map(|p| p.pid()) == Some(probe.pid()) {
            self.process = None;
        }
        self.last_shutdown = Some(report.clone());
        report
    }

    /// Wait for the attached application, if any
    pub fn verify_attached_shutdown(&mut self) -> Option<ShutdownReport> {
        let probe = self.process.take()?;
        Some(self.verify_clean_shutdown(probe))
    }

    /// Hand the sandbox over to the caller without tearing it down
    pub fn detach(mut self) -> Option<SettingsInstance> {
        self.finished = true;
        self.process = None;
        self.instance.take()
    }

    /// Tear the sandbox down and report what happened
    pub fn teardown(mut self) -> TeardownReport {
        self.finish()
    }

    fn finish(&mut self) -> TeardownReport {
        self.finished = true;
        let start = Instant::now();

        let Some(instance) = self.instance.take() else {
            debug!("No settings sandbox to tear down");
            return TeardownReport {
                sandbox_root: None,
                shutdown: self.last_shutdown.take(),
                settings_flush: None,
                removed: false,
                elapsed_ms: 0,
                finished_at: Utc::now(),
            };
        };

        if self.baseline.is_none() {
            let devices = self.config.layout.devices_path(instance.settings_dir());
            self.baseline = Some(SettingsBaseline::capture(devices));
        }

        // A confirmation only covers the pid it was made for.
        let shutdown = match self.process.take() {
            Some(mut probe) => {
                let confirmed = self.verifier.state() == ShutdownState::Confirmed
                    && self.last_shutdown.as_ref().map(|r| r.pid) == Some(probe.pid());
                if confirmed {
                    self.last_shutdown.take()
                } else {
                    Some(self.verifier.wait_for_process_death(&mut probe))
                }
            }
            None => self.last_shutdown.take(),
        };

        let settings_flush = self
            .baseline
            .take()
            .map(|baseline| self.verifier.wait_for_settings_flush(&baseline));

        let shutdown_config = &self.config.shutdown;
        let removed = instance.remove(
            shutdown_config.remove_timeout(),
            shutdown_config.poll_interval(),
        );
        if !removed {
            warn!("Leaked settings sandbox {}", instance.root().display());
        }

        TeardownReport {
            sandbox_root: Some(instance.root().to_path_buf()),
            shutdown,
            settings_flush,
            removed,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            finished_at: Utc::now(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let report = self.finish();
        debug!("Session teardown on drop: removed={}", report.removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::OsProcess;
    use crate::shutdown::ProcessOutcome;
    use std::fs;
    use tempfile::TempDir;

    fn setup(tmp: &TempDir) -> SandboxConfig {
        let template = tmp.path().join("suite").join("settings").join("unix");
        let qtc = template.join("QtProject").join("qtcreator");
        fs::create_dir_all(&qtc).unwrap();
        fs::write(qtc.join("toolchains.xml"), "<toolchains/>\n").unwrap();
        fs::write(qtc.join("devices.xml"), "<devices/>\n").unwrap();
        fs::create_dir_all(tmp.path().join("scratch")).unwrap();

        let mut config = SandboxConfig::default();
        config.suite_root = tmp.path().join("suite");
        config.layout.temp_root = Some(tmp.path().join("scratch"));
        config.shutdown.process_timeout_ms = 200;
        config.shutdown.settings_flush_timeout_ms = 50;
        config.shutdown.remove_timeout_ms = 200;
        config.shutdown.poll_interval_ms = 10;
        config
    }

    fn linux_session(config: SandboxConfig) -> Session {
        Session::new(config, HostPlatform::Linux, EnvOverrides::default())
    }

    #[test]
    fn test_opt_out_skips_provisioning() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp);
        let overrides = EnvOverrides {
            no_settings_path: true,
            src_path: Some(PathBuf::from("/src")),
        };
        let mut session = Session::new(config, HostPlatform::Linux, overrides);

        let env = session.provision_environment().unwrap();

        assert_eq!(env.settings_arg, "");
        assert!(env.settings_dir.is_none());
        assert_eq!(env.src_path, PathBuf::from("/src"));
        assert_eq!(fs::read_dir(tmp.path().join("scratch")).unwrap().count(), 0);

        let report = session.teardown();
        assert!(report.sandbox_root.is_none());
    }

    #[test]
    fn test_provision_twice_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut session = linux_session(setup(&tmp));

        session.provision_environment().unwrap();
        let err = session.provision_environment().unwrap_err();

        assert!(matches!(err, HarnessError::AlreadyProvisioned(_)));
    }

    #[test]
    fn test_settings_arg_points_at_instance() {
        let tmp = TempDir::new().unwrap();
        let mut session = linux_session(setup(&tmp));

        let env = session.provision_environment().unwrap();
        let dir = env.settings_dir.clone().unwrap();

        assert_eq!(env.settings_arg, format!(" -settingspath \"{}\"", dir.display()));
        assert!(dir.join("QtProject").join("qtcreator").join("devices.xml").exists());
    }

    #[test]
    fn test_drop_removes_sandbox() {
        let tmp = TempDir::new().unwrap();
        let root = {
            let mut session = linux_session(setup(&tmp));
            session.provision_environment().unwrap();
            session.instance().unwrap().root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn test_panic_still_removes_sandbox() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp);
        let scratch = config.layout.temp_root.clone().unwrap();

        let result = std::panic::catch_unwind(move || {
            let mut session = linux_session(config);
            session.provision_environment().unwrap();
            panic!("test case failed");
        });

        assert!(result.is_err());
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_detach_keeps_sandbox() {
        let tmp = TempDir::new().unwrap();
        let mut session = linux_session(setup(&tmp));
        session.provision_environment().unwrap();

        let instance = session.detach().unwrap();
        assert!(instance.settings_dir().exists());
        assert!(instance.remove(
            std::time::Duration::from_millis(200),
            std::time::Duration::from_millis(10)
        ));
    }

    #[test]
    fn test_verified_shutdown_is_not_repeated() {
        let tmp = TempDir::new().unwrap();
        let mut session = linux_session(setup(&tmp));
        session.provision_environment().unwrap();

        let report = session.verify_clean_shutdown(OsProcess::new(-1));
        assert_eq!(session.shutdown_state(), ShutdownState::Confirmed);

        let teardown = session.teardown();
        assert_eq!(teardown.shutdown.unwrap().pid, report.pid);
        assert_eq!(teardown.settings_flush, Some(FlushOutcome::TimedOut));
        assert!(teardown.removed);
    }

    /// Alive for a fixed number of polls
    struct Countdown {
        pid: i64,
        polls_left: u32,
    }

    impl ProcessProbe for Countdown {
        fn pid(&self) -> i64 {
            self.pid
        }

        fn is_alive(&mut self) -> bool {
            if self.polls_left == 0 {
                return false;
            }
            self.polls_left -= 1;
            true
        }
    }

    #[test]
    fn test_unrelated_confirmation_does_not_skip_attached_wait() {
        let tmp = TempDir::new().unwrap();
        let mut session = linux_session(setup(&tmp));
        session.provision_environment().unwrap();

        session
            .attach(Box::new(Countdown {
                pid: 4242,
                polls_left: 5,
            }))
            .unwrap();
        let unrelated = session.verify_clean_shutdown(OsProcess::new(-1));
        assert_eq!(unrelated.pid, -1);

        let teardown = session.teardown();
        let shutdown = teardown.shutdown.unwrap();
        assert_eq!(shutdown.pid, 4242);
        assert_eq!(shutdown.outcome, ProcessOutcome::Exited);
        assert!(shutdown.polls > 1);
        assert!(teardown.removed);
    }

    #[test]
    fn test_confirmed_attached_process_is_not_waited_again() {
        let tmp = TempDir::new().unwrap();
        let mut session = linux_session(setup(&tmp));
        session.provision_environment().unwrap();

        session
            .attach(Box::new(Countdown {
                pid: 4242,
                polls_left: 2,
            }))
            .unwrap();
        let report = session.verify_attached_shutdown().unwrap();
        assert_eq!(report.outcome, ProcessOutcome::Exited);

        let teardown = session.teardown();
        assert_eq!(teardown.shutdown.unwrap().polls, report.polls);
    }

    #[cfg(unix)]
    #[test]
    fn test_teardown_reports_leaked_sandbox() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};

        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp);
        let scratch = config.layout.temp_root.clone().unwrap();
        let remove_timeout = Duration::from_millis(config.shutdown.remove_timeout_ms);

        let mut session = linux_session(config);
        let env = session.provision_environment().unwrap();
        session.verify_clean_shutdown(OsProcess::new(-1));
        fs::set_permissions(&scratch, fs::Permissions::from_mode(0o555)).unwrap();

        // Permission bits do not bind a privileged user.
        if fs::write(scratch.join("canary"), "").is_ok() {
            fs::set_permissions(&scratch, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let start = Instant::now();
        let report = session.teardown();
        let elapsed = start.elapsed();
        fs::set_permissions(&scratch, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(!report.removed);
        assert_eq!(report.sandbox_root, env.sandbox_root);
        assert!(env.sandbox_root.unwrap().exists());
        // flush wait (50ms) plus the removal window, with scheduling slack
        assert!(elapsed >= remove_timeout);
        assert!(elapsed < remove_timeout + Duration::from_millis(50 + 500));
    }

    #[cfg(unix)]
    #[test]
    fn test_second_live_process_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut session = linux_session(setup(&tmp));
        session.provision_environment().unwrap();

        session
            .attach(Box::new(OsProcess::new(i64::from(std::process::id()))))
            .unwrap();
        let err = session.attach(Box::new(OsProcess::new(-1))).unwrap_err();

        assert!(matches!(err, HarnessError::ProcessAlreadyAttached(_)));
        // Drop would otherwise wait out the timeout on this test process.
        session.process = None;
    }
}
