//! Patch an existing settings directory

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use autsandbox_common::{platform, ConfigPatcher, HostPlatform, SandboxConfig};

use crate::commands::abi::preference;
use crate::output::{print_item, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct PatchArgs {
    /// Settings directory (the one passed to -settingspath)
    pub settings_dir: PathBuf,

    /// Leave home-directory placeholders alone
    #[arg(long)]
    pub skip_tilde: bool,

    /// Leave ABI placeholders alone
    #[arg(long)]
    pub skip_abi: bool,

    /// Pick 32-bit ABIs regardless of the host
    #[arg(long, conflicts_with = "prefer_64bit")]
    pub prefer_32bit: bool,

    /// Pick 64-bit ABIs regardless of the host
    #[arg(long)]
    pub prefer_64bit: bool,
}

#[derive(Serialize)]
pub struct PatchDisplay {
    pub toolchains: String,
    pub tilde_lines: Option<usize>,
    pub abi_lines: Option<usize>,
}

impl TableDisplay for PatchDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Toolchains", "Tilde Lines", "ABI Lines"]
    }

    fn row(&self) -> Vec<String> {
        let count = |n: Option<usize>| n.map_or_else(|| "skipped".to_string(), |n| n.to_string());
        vec![
            self.toolchains.clone(),
            count(self.tilde_lines),
            count(self.abi_lines),
        ]
    }
}

pub fn run_passes(
    args: &PatchArgs,
    config: &SandboxConfig,
    host: HostPlatform,
) -> Result<PatchDisplay> {
    let toolchains = config.layout.toolchains_path(&args.settings_dir);
    if !toolchains.is_file() {
        bail!("no toolchain descriptor at {}", toolchains.display());
    }

    let patcher = ConfigPatcher::new(config.patch.clone());

    let tilde_lines = if args.skip_tilde || !host.substitutes_tilde() {
        None
    } else {
        let home = platform::home_dir().context("cannot resolve the home directory")?;
        Some(patcher.substitute_tilde(&toolchains, &home)?)
    };

    let abi_lines = if args.skip_abi {
        None
    } else {
        let prefer64 = preference(args.prefer_32bit, args.prefer_64bit, host.is_64bit());
        Some(
            patcher
                .substitute_abis(&toolchains, prefer64)
                .with_context(|| format!("patching {}", toolchains.display()))?,
        )
    };

    Ok(PatchDisplay {
        toolchains: toolchains.display().to_string(),
        tilde_lines,
        abi_lines,
    })
}

pub fn execute(args: PatchArgs, config: &SandboxConfig, format: OutputFormat) -> Result<()> {
    let display = run_passes(&args, config, HostPlatform::current())?;
    print_item(&display, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args(dir: PathBuf) -> PatchArgs {
        PatchArgs {
            settings_dir: dir,
            skip_tilde: true,
            skip_abi: false,
            prefer_32bit: true,
            prefer_64bit: false,
        }
    }

    #[test]
    fn test_patch_abi_only() {
        let tmp = TempDir::new().unwrap();
        let qtc = tmp.path().join("QtProject").join("qtcreator");
        fs::create_dir_all(&qtc).unwrap();
        fs::write(
            qtc.join("toolchains.xml"),
            "<valuelist key=\"SupportedAbis\">\n<v>arm-32bit</v>\n</valuelist>\n<v>SET_BY_SQUISH</v>\n<v>~</v>\n",
        )
        .unwrap();

        let display = run_passes(
            &args(tmp.path().to_path_buf()),
            &SandboxConfig::default(),
            HostPlatform::Linux,
        )
        .unwrap();

        assert_eq!(display.tilde_lines, None);
        assert_eq!(display.abi_lines, Some(1));
        let patched = fs::read_to_string(qtc.join("toolchains.xml")).unwrap();
        assert!(patched.ends_with("<v>arm-32bit</v>\n<v>~</v>\n"));
    }

    #[test]
    fn test_missing_descriptor() {
        let tmp = TempDir::new().unwrap();
        let result = run_passes(
            &args(tmp.path().to_path_buf()),
            &SandboxConfig::default(),
            HostPlatform::Linux,
        );
        assert!(result.is_err());
    }
}
