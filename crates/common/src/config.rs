//! Sandbox configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::platform::HostPlatform;

/// Opt-out variable; a value of exactly `1` disables settings isolation
pub const ENV_NO_SETTINGS_PATH: &str = "SYSTEST_NOSETTINGSPATH";

/// Overrides the source tree location handed to test cases
pub const ENV_SRC_PATH: &str = "SYSTEST_SRCPATH";

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Root of the test suite; templates live under `settings/`
    pub suite_root: PathBuf,

    /// Explicit template directory (overrides the platform default)
    pub template_dir: Option<PathBuf>,

    /// Settings directory layout
    pub layout: LayoutConfig,

    /// Placeholder markers inside the toolchain descriptor
    pub patch: PatchConfig,

    /// Shutdown and cleanup timing
    pub shutdown: ShutdownConfig,

    /// Application launch settings
    pub launch: LaunchConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            suite_root: PathBuf::from("."),
            template_dir: None,
            layout: LayoutConfig::default(),
            patch: PatchConfig::default(),
            shutdown: ShutdownConfig::default(),
            launch: LaunchConfig::default(),
        }
    }
}

/// Where things live inside a settings directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Directory holding the application's settings files
    pub settings_subdir: PathBuf,

    /// The patched toolchain descriptor
    pub toolchains_file: String,

    /// Sibling file whose mtime signals a settings flush on exit
    pub devices_file: String,

    /// Name of the instance directory inside the temporary root
    pub instance_dir_name: String,

    /// Prefix of the temporary root directory
    pub temp_prefix: String,

    /// Parent of temporary roots (system temp dir when unset)
    pub temp_root: Option<PathBuf>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            settings_subdir: PathBuf::from("QtProject").join("qtcreator"),
            toolchains_file: "toolchains.xml".to_string(),
            devices_file: "devices.xml".to_string(),
            instance_dir_name: "settings".to_string(),
            temp_prefix: "autsandbox-".to_string(),
            temp_root: None,
        }
    }
}

impl LayoutConfig {
    pub fn toolchains_path(&self, settings_dir: &Path) -> PathBuf {
        settings_dir
            .join(&self.settings_subdir)
            .join(&self.toolchains_file)
    }

    pub fn devices_path(&self, settings_dir: &Path) -> PathBuf {
        settings_dir
            .join(&self.settings_subdir)
            .join(&self.devices_file)
    }
}

/// Markers recognized by the patch passes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    pub home_sentinel: String,
    pub section_marker: String,
    pub section_close: String,
    pub abi_sentinel: String,
    pub backup_suffix: String,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            home_sentinel: "~".to_string(),
            section_marker: "SupportedAbis".to_string(),
            section_close: "</valuelist>".to_string(),
            abi_sentinel: "SET_BY_SQUISH".to_string(),
            backup_suffix: "_orig".to_string(),
        }
    }
}

/// Bounds for the shutdown waits, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub process_timeout_ms: u64,
    pub settings_flush_timeout_ms: u64,
    pub remove_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            process_timeout_ms: 10_000,
            settings_flush_timeout_ms: 5_000,
            remove_timeout_ms: 2_000,
            poll_interval_ms: 100,
        }
    }
}

impl ShutdownConfig {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }

    pub fn settings_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.settings_flush_timeout_ms)
    }

    pub fn remove_timeout(&self) -> Duration {
        Duration::from_millis(self.remove_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// How the application under test is launched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Command-line flag that points the application at a settings directory
    pub settings_flag: String,

    /// Executable name used by test cases
    pub aut_name: String,

    /// Bundle name of the same executable on macOS
    pub mac_aut_name: String,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            settings_flag: "-settingspath".to_string(),
            aut_name: "qtcreator".to_string(),
            mac_aut_name: "Qt Creator".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations that would make a wait or a pass meaningless
    pub fn validate(&self) -> Result<()> {
        if self.shutdown.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "shutdown.poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        let markers = [
            ("patch.home_sentinel", &self.patch.home_sentinel),
            ("patch.section_marker", &self.patch.section_marker),
            ("patch.section_close", &self.patch.section_close),
            ("patch.abi_sentinel", &self.patch.abi_sentinel),
            ("patch.backup_suffix", &self.patch.backup_suffix),
        ];
        for (name, value) in markers {
            if value.is_empty() {
                return Err(Error::InvalidConfig(format!("{} must not be empty", name)));
            }
        }

        if self.layout.toolchains_file.is_empty() || self.layout.instance_dir_name.is_empty() {
            return Err(Error::InvalidConfig(
                "layout file and directory names must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Template directory for the given platform
    pub fn template_dir(&self, platform: HostPlatform) -> PathBuf {
        self.template_dir.clone().unwrap_or_else(|| {
            self.suite_root
                .join("settings")
                .join(platform.template_flavor())
        })
    }
}

/// Values read from the process environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// Session runs against the user's real settings
    pub no_settings_path: bool,

    /// Source tree location
    pub src_path: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            no_settings_path: std::env::var(ENV_NO_SETTINGS_PATH).as_deref() == Ok("1"),
            src_path: std::env::var_os(ENV_SRC_PATH).map(PathBuf::from),
        }
    }

    /// Source tree, defaulting to `<sdk>/src`
    pub fn src_path(&self, platform: HostPlatform) -> PathBuf {
        self.src_path
            .clone()
            .unwrap_or_else(|| platform.default_sdk_path().join("src"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.shutdown.process_timeout(), Duration::from_secs(10));
        assert_eq!(config.shutdown.settings_flush_timeout(), Duration::from_secs(5));
        assert_eq!(config.shutdown.remove_timeout(), Duration::from_secs(2));
        assert_eq!(config.patch.abi_sentinel, "SET_BY_SQUISH");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_layout_paths() {
        let layout = LayoutConfig::default();
        let dir = Path::new("/tmp/x/settings");
        assert_eq!(
            layout.toolchains_path(dir),
            dir.join("QtProject").join("qtcreator").join("toolchains.xml")
        );
        assert_eq!(
            layout.devices_path(dir),
            dir.join("QtProject").join("qtcreator").join("devices.xml")
        );
    }

    #[test]
    fn test_template_dir_by_platform() {
        let config = SandboxConfig {
            suite_root: PathBuf::from("/suite"),
            ..Default::default()
        };
        assert_eq!(
            config.template_dir(HostPlatform::Linux),
            PathBuf::from("/suite/settings/unix")
        );
        assert_eq!(
            config.template_dir(HostPlatform::Windows),
            PathBuf::from("/suite/settings").join("windows")
        );

        let explicit = SandboxConfig {
            template_dir: Some(PathBuf::from("/elsewhere")),
            ..Default::default()
        };
        assert_eq!(
            explicit.template_dir(HostPlatform::Linux),
            PathBuf::from("/elsewhere")
        );
    }

    #[test]
    fn test_save_and_load_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("autsandbox.toml");

        std::fs::write(
            &path,
            "suite_root = \"/suite\"\n\n[shutdown]\nprocess_timeout_ms = 250\n",
        )
        .unwrap();
        let config = SandboxConfig::load(&path).unwrap();
        assert_eq!(config.suite_root, PathBuf::from("/suite"));
        assert_eq!(config.shutdown.process_timeout_ms, 250);
        assert_eq!(config.shutdown.poll_interval_ms, 100);

        let out = tmp.path().join("nested").join("saved.toml");
        config.save(&out).unwrap();
        let reloaded = SandboxConfig::load(&out).unwrap();
        assert_eq!(reloaded.shutdown.process_timeout_ms, 250);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = SandboxConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.launch.settings_flag, "-settingspath");
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = SandboxConfig::default();
        config.shutdown.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_marker_rejected() {
        let mut config = SandboxConfig::default();
        config.patch.section_marker.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("patch.section_marker"));
    }

    #[test]
    fn test_src_path_override() {
        let overrides = EnvOverrides {
            no_settings_path: false,
            src_path: Some(PathBuf::from("/src/qtcreator")),
        };
        assert_eq!(
            overrides.src_path(HostPlatform::Linux),
            PathBuf::from("/src/qtcreator")
        );

        let defaults = EnvOverrides::default();
        assert_eq!(
            defaults.src_path(HostPlatform::Windows),
            PathBuf::from("C:\\QtSDK").join("src")
        );
    }
}
