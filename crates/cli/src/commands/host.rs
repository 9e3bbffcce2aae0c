//! Host detection command

use anyhow::Result;
use serde::Serialize;

use autsandbox_common::{platform, EnvOverrides, HostPlatform, SandboxConfig};

use crate::output::{or_dash, print_item, OutputFormat, TableDisplay};

#[derive(Serialize)]
pub struct HostDisplay {
    pub platform: HostPlatform,
    pub machine: Option<String>,
    pub is_64bit: bool,
    pub template_dir: String,
    pub sdk_path: String,
    pub src_path: String,
    pub isolation: bool,
}

impl TableDisplay for HostDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Platform", "Machine", "64bit", "Template", "SDK", "Source", "Isolation"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.platform.to_string(),
            or_dash(self.machine.as_ref()),
            self.is_64bit.to_string(),
            self.template_dir.clone(),
            self.sdk_path.clone(),
            self.src_path.clone(),
            if self.isolation { "on" } else { "off" }.to_string(),
        ]
    }
}

pub fn execute(config: &SandboxConfig, format: OutputFormat) -> Result<()> {
    let host = HostPlatform::current();
    let overrides = EnvOverrides::from_env();

    print_item(
        &HostDisplay {
            platform: host,
            machine: platform::machine_name(),
            is_64bit: host.is_64bit(),
            template_dir: config.template_dir(host).display().to_string(),
            sdk_path: host.default_sdk_path().display().to_string(),
            src_path: overrides.src_path(host).display().to_string(),
            isolation: !overrides.no_settings_path,
        },
        format,
    );
    Ok(())
}
