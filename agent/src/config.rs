use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Deserialize;

use crate::vmem::RefreshPolicy;

/// How each report is written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// One human-readable line.
    Text,
}

/// Agent configuration loaded from a TOML file or defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Seconds between reports.
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Re-query cached figures once they are older than this many seconds.
    /// Unset keeps the first value for the life of the process.
    #[serde(default)]
    pub refresh_after_secs: Option<u64>,

    #[serde(default)]
    pub output: OutputFormat,
}

fn default_report_interval() -> u64 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
            refresh_after_secs: None,
            output: OutputFormat::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AgentConfig = toml::de::from_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, else from the per-user default location if
    /// that file exists, else fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::from_secs(self.refresh_after_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be greater than zero");
        }
        Ok(())
    }
}

/// `<config dir>/swapstat/config.toml`, e.g. `~/.config/swapstat/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("swapstat").join("config.toml"))
}
