//! Run an application inside a fresh sandbox

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use autsandbox_common::SandboxConfig;
use autsandbox_harness::{ChildProcess, LaunchCommand, Session};

use crate::commands::TeardownDisplay;
use crate::output::{print_item, print_success, print_warning, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Application and its arguments; the settings path is appended
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

pub fn execute(args: RunArgs, config: SandboxConfig, format: OutputFormat) -> Result<()> {
    let mut session = Session::from_env(config);
    let env = session
        .provision_environment()
        .context("failed to provision settings sandbox")?;
    if let Some(dir) = &env.settings_dir {
        info!("Settings sandbox at {}", dir.display());
    }

    let mut parts = args.command.into_iter();
    let program = parts.next().context("no application given")?;
    let launch = LaunchCommand::new(program).args(parts);

    // Baseline before the spawn, while nothing can have touched the settings.
    session.capture_baseline();
    let child = session
        .command(&launch)
        .spawn()
        .with_context(|| format!("failed to launch {}", launch.program))?;
    let mut child = ChildProcess::new(child);

    let status = child.wait().context("failed to wait for the application")?;
    if status.success() {
        print_success(&format!("{} exited", launch.program));
    } else {
        print_warning(&format!("{} exited with {}", launch.program, status));
    }

    session.verify_clean_shutdown(child);
    let report = session.teardown();
    print_item(&TeardownDisplay { report }, format);
    Ok(())
}
