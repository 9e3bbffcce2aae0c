//! autsandbox common library
//!
//! Configuration, host detection, ABI selection and the line-oriented
//! patch passes applied to a freshly provisioned settings directory.

pub mod abi;
pub mod config;
pub mod error;
pub mod patch;
pub mod platform;

// Re-export commonly used types
pub use abi::select_abi;
pub use config::{EnvOverrides, SandboxConfig};
pub use error::{Error, Result};
pub use patch::{AbiScanner, ConfigPatcher, ScanState};
pub use platform::HostPlatform;
