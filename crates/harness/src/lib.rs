//! autsandbox harness
//!
//! Lifecycle of a disposable settings sandbox for a desktop application
//! driven by an external UI-automation tool:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Session                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  provision_environment() -> Environment                     │
//! │    └── Provisioner::provision(template) -> SettingsInstance │
//! │          ├── copy_tree(template, <tmp>/settings)            │
//! │          ├── ConfigPatcher::substitute_tilde   (unix only)  │
//! │          └── ConfigPatcher::substitute_abis                 │
//! │  launch(LaunchCommand) / attach(ProcessProbe)               │
//! │  verify_clean_shutdown(ProcessProbe) -> ShutdownReport      │
//! │  teardown() / Drop -> TeardownReport                        │
//! │    ├── ShutdownVerifier::wait_for_process_death             │
//! │    ├── ShutdownVerifier::wait_for_settings_flush            │
//! │    └── SettingsInstance::remove                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod launch;
pub mod poll;
pub mod process;
pub mod provision;
pub mod session;
pub mod shutdown;

pub use error::{HarnessError, HarnessResult};
pub use launch::LaunchCommand;
pub use process::{ChildProcess, OsProcess, ProcessProbe};
pub use provision::{Provisioner, SettingsInstance};
pub use session::{Environment, Session, TeardownReport};
pub use shutdown::{ShutdownReport, ShutdownState, ShutdownVerifier};
