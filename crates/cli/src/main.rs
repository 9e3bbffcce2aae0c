//! autsandbox CLI - Main Entry Point

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;

use autsandbox_cli::commands::{abi, host, patch, provision, run, teardown};
use autsandbox_cli::output::{self, print_error};
use autsandbox_common::{HostPlatform, SandboxConfig};

/// Disposable settings sandboxes for desktop applications under test
#[derive(Parser)]
#[command(name = "autsandbox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file; defaults are used when it does not exist
    #[arg(long, default_value = "autsandbox.toml", env = "AUTSANDBOX_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a sandbox and leave it on disk
    Provision,

    /// Patch the toolchain descriptor of an existing settings directory
    Patch(patch::PatchArgs),

    /// Pick an ABI from a list of candidates
    SelectAbi(abi::SelectAbiArgs),

    /// Show host detection results
    Host,

    /// Wait for an application and remove a detached sandbox
    Teardown(teardown::TeardownArgs),

    /// Run an application inside a fresh sandbox
    Run(run::RunArgs),
}

fn load_config(path: &Path) -> anyhow::Result<SandboxConfig> {
    if path.exists() {
        SandboxConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))
    } else {
        debug!("No config at {}, using defaults", path.display());
        Ok(SandboxConfig::default())
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("{:#}", e));
            std::process::exit(2);
        }
    };

    match cli.command {
        Commands::Provision => provision::execute(config, cli.format)?,
        Commands::Patch(args) => patch::execute(args, &config, cli.format)?,
        Commands::SelectAbi(args) => {
            abi::execute(args, HostPlatform::current().is_64bit(), cli.format)?
        }
        Commands::Host => host::execute(&config, cli.format)?,
        Commands::Teardown(args) => teardown::execute(args, config, cli.format)?,
        Commands::Run(args) => run::execute(args, config, cli.format)?,
    }

    Ok(())
}
