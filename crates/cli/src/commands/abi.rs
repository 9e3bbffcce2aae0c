//! ABI selection command

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use autsandbox_common::select_abi;

use crate::output::{print_item, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct SelectAbiArgs {
    /// Candidate ABI labels, in the order they appear in the descriptor
    #[arg(required = true)]
    pub candidates: Vec<String>,

    /// Look for a 32-bit ABI instead of the host's bitness
    #[arg(long, conflicts_with = "prefer_64bit")]
    pub prefer_32bit: bool,

    /// Look for a 64-bit ABI regardless of the host's bitness
    #[arg(long)]
    pub prefer_64bit: bool,
}

#[derive(Serialize)]
pub struct AbiDisplay {
    pub prefer64: bool,
    pub candidates: Vec<String>,
    pub selected: String,
}

impl TableDisplay for AbiDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Prefer 64bit", "Candidates", "Selected"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.prefer64.to_string(),
            self.candidates.join(", "),
            self.selected.clone(),
        ]
    }
}

/// Resolve the bitness preference from flags, falling back to the host
pub fn preference(prefer_32bit: bool, prefer_64bit: bool, host_is_64bit: bool) -> bool {
    if prefer_32bit {
        false
    } else if prefer_64bit {
        true
    } else {
        host_is_64bit
    }
}

pub fn execute(args: SelectAbiArgs, host_is_64bit: bool, format: OutputFormat) -> Result<()> {
    let prefer64 = preference(args.prefer_32bit, args.prefer_64bit, host_is_64bit);
    let selected = select_abi(&args.candidates, prefer64).context("ABI selection failed")?;

    print_item(
        &AbiDisplay {
            prefer64,
            candidates: args.candidates,
            selected,
        },
        format,
    );
    Ok(())
}
