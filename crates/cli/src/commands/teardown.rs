//! Tear down a detached sandbox

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use autsandbox_common::SandboxConfig;
use autsandbox_harness::{OsProcess, Session, SettingsInstance};

use crate::commands::TeardownDisplay;
use crate::output::{print_item, print_warning, OutputFormat};

#[derive(Args)]
pub struct TeardownArgs {
    /// Sandbox root printed by `autsandbox provision`
    pub sandbox_root: PathBuf,

    /// Pid of the application that used the sandbox
    #[arg(long, allow_hyphen_values = true)]
    pub pid: Option<i64>,
}

pub fn execute(args: TeardownArgs, config: SandboxConfig, format: OutputFormat) -> Result<()> {
    // Only directories this tool provisioned are ever removed.
    let instance = SettingsInstance::reclaim(&args.sandbox_root, &config.layout)?;

    let mut session = Session::from_env(config);
    session.adopt(instance)?;
    if let Some(pid) = args.pid {
        session.attach(Box::new(OsProcess::new(pid)))?;
    }

    let report = session.teardown();
    if !report.removed {
        print_warning(&format!(
            "{} could not be removed",
            args.sandbox_root.display()
        ));
    }
    print_item(&TeardownDisplay { report }, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_refuses_directory_it_did_not_provision() {
        let tmp = TempDir::new().unwrap();
        let scratch = tmp.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();

        let project = tmp.path().join("my-project");
        fs::create_dir_all(project.join("settings")).unwrap();
        fs::write(project.join("important.txt"), "keep me").unwrap();

        let mut config = SandboxConfig::default();
        config.layout.temp_root = Some(scratch);

        let result = execute(
            TeardownArgs {
                sandbox_root: project.clone(),
                pid: None,
            },
            config,
            OutputFormat::Plain,
        );

        assert!(result.is_err());
        assert!(project.join("important.txt").exists());
    }
}
