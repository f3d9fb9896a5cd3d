//! Error types for step control flow and harness configuration.

use std::path::PathBuf;

use j84_canbus::BusError;

use crate::control::Ending;

/// Why a step stopped before returning normally.
///
/// `Interrupted` is control flow, not a failure: it bubbles through `?` from
/// the suspension point that observed the ending up to the part controller.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("interrupted: {0}")]
    Interrupted(Ending),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl StepError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, StepError::Interrupted(_))
    }
}

/// Result returned by every step and suspension point.
pub type RunResult<T> = Result<T, StepError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}
