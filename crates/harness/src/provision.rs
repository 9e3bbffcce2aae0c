//! Settings directory provisioning

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use autsandbox_common::platform::{self, HostPlatform};
use autsandbox_common::config::LayoutConfig;
use autsandbox_common::{ConfigPatcher, Error, SandboxConfig};

use crate::error::{HarnessError, HarnessResult};
use crate::poll::wait_until;

/// A private, patched copy of the settings template.
///
/// Lives at `<root>/<instance_dir_name>`; `root` is the unique temporary
/// directory and is what gets removed at teardown.
#[derive(Debug, PartialEq, Eq)]
pub struct SettingsInstance {
    root: PathBuf,
    settings_dir: PathBuf,
}

impl SettingsInstance {
    /// Take ownership of an instance provisioned earlier, e.g. by another
    /// invocation of the CLI.
    pub fn adopt(root: impl Into<PathBuf>, instance_dir_name: &str) -> Self {
        let root = root.into();
        let settings_dir = root.join(instance_dir_name);
        Self { root, settings_dir }
    }

    /// Adopt a sandbox left behind by a detached session, after checking
    /// that `root` is one this tool created: a direct child of the temp root,
    /// named with the temp prefix, holding a settings tree with a toolchain
    /// descriptor.
    pub fn reclaim(root: &Path, layout: &LayoutConfig) -> HarnessResult<Self> {
        let refuse = |reason: String| HarnessError::NotASandbox {
            path: root.to_path_buf(),
            reason,
        };

        let canonical = root
            .canonicalize()
            .map_err(|e| refuse(format!("cannot resolve path: {}", e)))?;
        let base = temp_base(layout);
        let base = base.canonicalize().unwrap_or(base);
        if canonical.parent() != Some(base.as_path()) {
            return Err(refuse(format!("not directly under {}", base.display())));
        }

        let named_like_sandbox = canonical
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&layout.temp_prefix));
        if !named_like_sandbox {
            return Err(refuse(format!(
                "name does not start with {:?}",
                layout.temp_prefix
            )));
        }

        let instance = Self::adopt(canonical, &layout.instance_dir_name);
        let toolchains = layout.toolchains_path(instance.settings_dir());
        if !toolchains.is_file() {
            return Err(refuse(format!("missing {}", toolchains.display())));
        }

        Ok(instance)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_dir(&self) -> &Path {
        &self.settings_dir
    }

    /// Argument string appended to every application launch
    pub fn settings_arg(&self, flag: &str) -> String {
        format!(" {} \"{}\"", flag, self.settings_dir.display())
    }

    /// Same as [`settings_arg`](Self::settings_arg), split for `Command::args`
    pub fn settings_args(&self, flag: &str) -> [String; 2] {
        [
            flag.to_string(),
            self.settings_dir.to_string_lossy().into_owned(),
        ]
    }

    /// Remove the instance, retrying until `timeout`.
    ///
    /// Returns false if the directory is still present afterwards; it is then
    /// left behind rather than fought over.
    pub fn remove(&self, timeout: Duration, interval: Duration) -> bool {
        let root = &self.root;
        let outcome = wait_until(timeout, interval, || {
            if !root.exists() {
                return true;
            }
            if let Err(e) = fs::remove_dir_all(root) {
                debug!("Removing {} failed: {}", root.display(), e);
            }
            !root.exists()
        });

        if outcome.is_satisfied() {
            info!("Removed settings sandbox {}", root.display());
            true
        } else {
            warn!(
                "Could not remove {} within {:?}; leaving it behind",
                root.display(),
                timeout
            );
            false
        }
    }
}

/// Creates settings instances from a template
#[derive(Debug, Clone)]
pub struct Provisioner {
    config: SandboxConfig,
    platform: HostPlatform,
    prefer64: bool,
    home: Option<PathBuf>,
}

impl Provisioner {
    pub fn new(config: SandboxConfig, platform: HostPlatform) -> Self {
        Self {
            config,
            platform,
            prefer64: platform.is_64bit(),
            home: platform::home_dir(),
        }
    }

    /// Override the detected host bitness
    pub fn with_prefer64(mut self, prefer64: bool) -> Self {
        self.prefer64 = prefer64;
        self
    }

    /// Override the home directory used by the tilde pass
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn platform(&self) -> HostPlatform {
        self.platform
    }

    /// Copy `template` into a fresh temporary directory and patch it.
    ///
    /// Any failure removes whatever was created and is fatal for the session.
    pub fn provision(&self, template: &Path) -> HarnessResult<SettingsInstance> {
        if !template.is_dir() {
            return Err(Error::TemplateMissing {
                path: template.to_path_buf(),
            }
            .into());
        }

        let layout = &self.config.layout;
        let temp_root = temp_base(layout);
        let root = tempfile::Builder::new()
            .prefix(&layout.temp_prefix)
            .tempdir_in(&temp_root)
            .map_err(|source| Error::Copy {
                from: template.to_path_buf(),
                to: temp_root.clone(),
                source,
            })?
            .keep();

        let instance = SettingsInstance::adopt(root, &layout.instance_dir_name);
        info!(
            "Provisioning settings from {} into {}",
            template.display(),
            instance.settings_dir().display()
        );

        if let Err(e) = self.populate(template, &instance) {
            if let Err(cleanup) = fs::remove_dir_all(instance.root()) {
                warn!(
                    "Failed to clean up {} after error: {}",
                    instance.root().display(),
                    cleanup
                );
            }
            return Err(e);
        }

        Ok(instance)
    }

    fn populate(&self, template: &Path, instance: &SettingsInstance) -> HarnessResult<()> {
        let files = copy_tree(template, instance.settings_dir())?;
        debug!("Copied {} file(s) from template", files);

        let patcher = ConfigPatcher::new(self.config.patch.clone());
        let toolchains = self.config.layout.toolchains_path(instance.settings_dir());

        if self.platform.substitutes_tilde() {
            let home = self.home.as_deref().ok_or_else(|| {
                Error::InvalidConfig("cannot resolve the home directory".to_string())
            })?;
            patcher.substitute_tilde(&toolchains, home)?;
        }
        patcher.substitute_abis(&toolchains, self.prefer64)?;

        Ok(())
    }
}

/// Directory sandboxes are created in
fn temp_base(layout: &LayoutConfig) -> PathBuf {
    layout.temp_root.clone().unwrap_or_else(std::env::temp_dir)
}

/// Recursively copy `from` into `to`, following symlinks. Returns the number
/// of files copied.
pub fn copy_tree(from: &Path, to: &Path) -> autsandbox_common::Result<u64> {
    let mut files = 0;

    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.map_err(|e| Error::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: e.into(),
        })?;

        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(relative);

        let copied = if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
        } else {
            fs::copy(entry.path(), &dest).map(|_| files += 1)
        };

        copied.map_err(|source| Error::Copy {
            from: entry.path().to_path_buf(),
            to: dest,
            source,
        })?;
    }

    Ok(files)
}
