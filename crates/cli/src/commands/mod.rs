//! CLI commands

pub mod abi;
pub mod host;
pub mod patch;
pub mod provision;
pub mod run;
pub mod teardown;

use serde::Serialize;

use autsandbox_harness::{Environment, TeardownReport};

use crate::output::{or_dash, TableDisplay};

/// Environment display wrapper for serialization
#[derive(Serialize)]
pub struct EnvironmentDisplay {
    pub platform: String,
    pub settings_arg: String,
    pub settings_dir: Option<String>,
    pub sandbox_root: Option<String>,
    pub sdk_path: String,
    pub src_path: String,
}

impl From<&Environment> for EnvironmentDisplay {
    fn from(env: &Environment) -> Self {
        Self {
            platform: env.platform.to_string(),
            settings_arg: env.settings_arg.clone(),
            settings_dir: env.settings_dir.as_ref().map(|p| p.display().to_string()),
            sandbox_root: env.sandbox_root.as_ref().map(|p| p.display().to_string()),
            sdk_path: env.sdk_path.display().to_string(),
            src_path: env.src_path.display().to_string(),
        }
    }
}

impl TableDisplay for EnvironmentDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Platform", "Settings Arg", "Settings Dir", "Sandbox Root", "SDK", "Source"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.platform.clone(),
            self.settings_arg.trim_start().to_string(),
            or_dash(self.settings_dir.as_ref()),
            or_dash(self.sandbox_root.as_ref()),
            self.sdk_path.clone(),
            self.src_path.clone(),
        ]
    }
}

/// Teardown display wrapper for serialization
#[derive(Serialize)]
pub struct TeardownDisplay {
    #[serde(flatten)]
    pub report: TeardownReport,
}

impl TableDisplay for TeardownDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Sandbox Root", "Pid", "Process", "Settings Flush", "Removed", "Elapsed"]
    }

    fn row(&self) -> Vec<String> {
        let report = &self.report;
        vec![
            or_dash(report.sandbox_root.as_ref().map(|p| p.display())),
            or_dash(report.shutdown.as_ref().map(|s| s.pid)),
            or_dash(report.shutdown.as_ref().map(|s| format!("{:?}", s.outcome))),
            or_dash(report.settings_flush.map(|f| format!("{:?}", f))),
            report.removed.to_string(),
            format!("{} ms", report.elapsed_ms),
        ]
    }
}
