//! autsandbox CLI
//!
//! Command-line interface for provisioning, patching and tearing down
//! settings sandboxes.

pub mod commands;
pub mod output;
