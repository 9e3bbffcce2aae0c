//! Provision a detached sandbox

use anyhow::{Context, Result};
use tracing::info;

use autsandbox_common::SandboxConfig;
use autsandbox_harness::Session;

use crate::commands::EnvironmentDisplay;
use crate::output::{print_item, print_warning, OutputFormat};

/// Provision a sandbox and leave it on disk for another process to use.
///
/// The sandbox is removed later with `autsandbox teardown <root>`.
pub fn execute(config: SandboxConfig, format: OutputFormat) -> Result<()> {
    let mut session = Session::from_env(config);
    let env = session
        .provision_environment()
        .context("failed to provision settings sandbox")?;

    match session.detach() {
        Some(instance) => info!("Sandbox {} left for the caller", instance.root().display()),
        None => print_warning("Settings isolation is disabled; nothing was provisioned"),
    }

    print_item(&EnvironmentDisplay::from(&env), format);
    Ok(())
}
