//! Application launch commands

use std::process::Command;
use tracing::info;

use autsandbox_common::config::LaunchConfig;
use autsandbox_common::HostPlatform;

/// Program and arguments of an application launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Apply platform naming quirks.
    ///
    /// On macOS the application bundle is not named like the executable test
    /// cases refer to, so a leading `aut_name` is swapped for `mac_aut_name`.
    pub fn for_platform(mut self, platform: HostPlatform, launch: &LaunchConfig) -> Self {
        if platform == HostPlatform::Darwin && self.program.starts_with(&launch.aut_name) {
            self.program = self.program.replacen(&launch.aut_name, &launch.mac_aut_name, 1);
            info!("Using workaround for MacOS (different AUT name)");
        }
        self
    }

    /// Build a `Command`, appending the sandbox settings arguments if any
    pub fn to_command(&self, settings_args: Option<&[String]>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(extra) = settings_args {
            cmd.args(extra);
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_bundle_name() {
        let launch = LaunchConfig::default();
        let cmd = LaunchCommand::new("qtcreator")
            .arg("-noload")
            .for_platform(HostPlatform::Darwin, &launch);
        assert_eq!(cmd.program, "Qt Creator");
        assert_eq!(cmd.args, vec!["-noload"]);
    }

    #[test]
    fn test_other_programs_untouched_on_mac() {
        let launch = LaunchConfig::default();
        let cmd = LaunchCommand::new("designer").for_platform(HostPlatform::Darwin, &launch);
        assert_eq!(cmd.program, "designer");
    }

    #[test]
    fn test_linux_keeps_executable_name() {
        let launch = LaunchConfig::default();
        let cmd = LaunchCommand::new("qtcreator").for_platform(HostPlatform::Linux, &launch);
        assert_eq!(cmd.program, "qtcreator");
    }

    #[test]
    fn test_settings_args_appended_last() {
        let settings = vec!["-settingspath".to_string(), "/tmp/s".to_string()];
        let cmd = LaunchCommand::new("qtcreator")
            .args(["-lastsession"])
            .to_command(Some(&settings));

        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-lastsession", "-settingspath", "/tmp/s"]);
    }
}
