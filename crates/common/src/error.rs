//! Error types for autsandbox

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the autsandbox Error
pub type Result<T> = std::result::Result<T, Error>;

/// autsandbox error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings template not found: {}", path.display())]
    TemplateMissing { path: PathBuf },

    #[error("Failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not guess ABI! Given ABIs: {candidates:?}")]
    NoMatchingAbi { candidates: Vec<String> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_matching_abi_lists_candidates() {
        let err = Error::NoMatchingAbi {
            candidates: vec!["arm-linux-generic-elf-16bit".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Could not guess ABI"));
        assert!(msg.contains("arm-linux-generic-elf-16bit"));
    }

    #[test]
    fn test_copy_error_keeps_source() {
        use std::error::Error as _;
        let err = Error::Copy {
            from: PathBuf::from("/a"),
            to: PathBuf::from("/b"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Failed to copy /a to /b"));
    }
}
