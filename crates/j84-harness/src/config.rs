//! Harness configuration, loadable from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use j84_canbus::BusTiming;
use j84_canbus::types::DEFAULT_TOOL_ADDRESS;
use j84_protocol::VehicleInformation;

use crate::error::ConfigError;
use crate::listener::Answer;

/// Top-level configuration for a harness run.
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    /// Source address the harness claims on the bus.
    #[serde(default = "default_tool_address")]
    pub tool_address: u8,
    /// SocketCAN interface name (e.g., "can0"). None runs against an idle mock.
    #[serde(default)]
    pub can_interface: Option<String>,
    /// Append-only transcript file.
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
    /// Answer to QUESTION prompts when running unattended.
    #[serde(default)]
    pub auto_answer: Option<AutoAnswer>,
    /// Extra Digital Annex PGN/SPN definitions merged over the built-in table.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub vehicle: VehicleInformation,
}

/// Protocol timing overrides, in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct TimingConfig {
    #[serde(default = "default_global_window_ms")]
    pub global_window_ms: u64,
    #[serde(default = "default_ds_timeout_ms")]
    pub ds_timeout_ms: u64,
    #[serde(default = "default_ds_retries")]
    pub ds_retries: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutoAnswer {
    Yes,
    No,
}

impl From<AutoAnswer> for Answer {
    fn from(value: AutoAnswer) -> Self {
        match value {
            AutoAnswer::Yes => Answer::Yes,
            AutoAnswer::No => Answer::No,
        }
    }
}

fn default_tool_address() -> u8 {
    DEFAULT_TOOL_ADDRESS
}

fn default_report_path() -> PathBuf {
    PathBuf::from("j1939-84-report.txt")
}

fn default_global_window_ms() -> u64 {
    1250
}

fn default_ds_timeout_ms() -> u64 {
    220
}

fn default_ds_retries() -> u32 {
    2
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            global_window_ms: default_global_window_ms(),
            ds_timeout_ms: default_ds_timeout_ms(),
            ds_retries: default_ds_retries(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tool_address: default_tool_address(),
            can_interface: None,
            report_path: default_report_path(),
            auto_answer: None,
            catalog_path: None,
            timing: TimingConfig::default(),
            vehicle: VehicleInformation::default(),
        }
    }
}

impl HarnessConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool_address >= 0xFE {
            return Err(ConfigError::Invalid(format!(
                "tool_address {} is not a claimable source address",
                self.tool_address
            )));
        }
        if self.timing.global_window_ms == 0 || self.timing.ds_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timing windows must be non-zero".into()));
        }
        Ok(())
    }

    pub fn bus_timing(&self) -> BusTiming {
        BusTiming {
            global_window: Duration::from_millis(self.timing.global_window_ms),
            ds_timeout: Duration::from_millis(self.timing.ds_timeout_ms),
            ds_retries: self.timing.ds_retries,
        }
    }
}
