//! Host platform identity and bitness detection

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Operating system family the harness runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPlatform {
    Linux,
    Darwin,
    Windows,
    Other,
}

impl HostPlatform {
    /// Platform of the running binary
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` style name
    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" => HostPlatform::Linux,
            "macos" => HostPlatform::Darwin,
            "windows" => HostPlatform::Windows,
            _ => HostPlatform::Other,
        }
    }

    /// Platforms whose toolchain descriptors carry `~` placeholders
    pub fn substitutes_tilde(self) -> bool {
        matches!(self, HostPlatform::Linux | HostPlatform::Darwin)
    }

    /// Directory name of the settings template for this platform
    pub fn template_flavor(self) -> &'static str {
        match self {
            HostPlatform::Windows => "windows",
            _ => "unix",
        }
    }

    /// Default SDK installation directory
    pub fn default_sdk_path(self) -> PathBuf {
        match self {
            HostPlatform::Windows => PathBuf::from("C:\\QtSDK"),
            _ => home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("QtSDK"),
        }
    }

    /// Whether the host OS is 64-bit.
    ///
    /// Windows consults `PROCESSOR_ARCHITEW6432` (set for WOW64 processes)
    /// before `PROCESSOR_ARCHITECTURE`; macOS uses the pointer width of this
    /// binary; everything else uses the machine string from `uname`.
    pub fn is_64bit(self) -> bool {
        match self {
            HostPlatform::Darwin => cfg!(target_pointer_width = "64"),
            HostPlatform::Windows => {
                let machine = std::env::var("PROCESSOR_ARCHITEW6432")
                    .or_else(|_| std::env::var("PROCESSOR_ARCHITECTURE"))
                    .ok();
                machine_is_64bit(machine.as_deref())
            }
            _ => machine_is_64bit(machine_name().as_deref()),
        }
    }
}

impl std::fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HostPlatform::Linux => "Linux",
            HostPlatform::Darwin => "Darwin",
            HostPlatform::Windows => "Windows",
            HostPlatform::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Interpret an architecture string; no signal means 32-bit.
pub fn machine_is_64bit(machine: Option<&str>) -> bool {
    match machine {
        Some(m) if !m.is_empty() => m.contains("64"),
        _ => false,
    }
}

/// Machine hardware name as reported by the kernel
#[cfg(unix)]
pub fn machine_name() -> Option<String> {
    nix::sys::utsname::uname()
        .ok()
        .map(|uts| uts.machine().to_string_lossy().into_owned())
}

#[cfg(not(unix))]
pub fn machine_name() -> Option<String> {
    Some(std::env::consts::ARCH.to_string())
}

/// Home directory of the current user
pub fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        if let Some(profile) = std::env::var_os("USERPROFILE").filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(profile));
        }
    }

    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some("x86_64"), true ; "linux amd64")]
    #[test_case(Some("aarch64"), true ; "linux arm64")]
    #[test_case(Some("AMD64"), true ; "windows amd64")]
    #[test_case(Some("i686"), false ; "linux x86")]
    #[test_case(Some("armv7l"), false ; "arm 32")]
    #[test_case(Some(""), false ; "empty string")]
    #[test_case(None, false ; "no signal")]
    fn test_machine_is_64bit(machine: Option<&str>, expected: bool) {
        assert_eq!(machine_is_64bit(machine), expected);
    }

    #[test]
    fn test_from_os() {
        assert_eq!(HostPlatform::from_os("linux"), HostPlatform::Linux);
        assert_eq!(HostPlatform::from_os("macos"), HostPlatform::Darwin);
        assert_eq!(HostPlatform::from_os("windows"), HostPlatform::Windows);
        assert_eq!(HostPlatform::from_os("freebsd"), HostPlatform::Other);
    }

    #[test]
    fn test_tilde_only_on_unix_likes() {
        assert!(HostPlatform::Linux.substitutes_tilde());
        assert!(HostPlatform::Darwin.substitutes_tilde());
        assert!(!HostPlatform::Windows.substitutes_tilde());
        assert!(!HostPlatform::Other.substitutes_tilde());
    }

    #[test]
    fn test_template_flavor() {
        assert_eq!(HostPlatform::Windows.template_flavor(), "windows");
        assert_eq!(HostPlatform::Linux.template_flavor(), "unix");
        assert_eq!(HostPlatform::Darwin.template_flavor(), "unix");
    }

    #[test]
    fn test_windows_sdk_path() {
        assert_eq!(
            HostPlatform::Windows.default_sdk_path(),
            PathBuf::from("C:\\QtSDK")
        );
    }
}
