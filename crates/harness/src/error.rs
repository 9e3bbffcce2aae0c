//! Error types for the sandbox harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Setup(#[from] autsandbox_common::Error),

    #[error("Failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("Application (pid {0}) is still attached to this session")]
    ProcessAlreadyAttached(i64),

    #[error("Session already owns the sandbox at {}", .0.display())]
    AlreadyProvisioned(std::path::PathBuf),

    #[error("{} is not a settings sandbox: {reason}", path.display())]
    NotASandbox {
        path: std::path::PathBuf,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
