//! Settings error types.

use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value parsed but is unusable, e.g. a reminder delay out of range.
    #[error("invalid setting {0}")]
    InvalidValue(String),
}

impl SettingsError {
    pub(crate) fn out_of_range(key: &str, min: impl Display, max: impl Display, got: impl Display) -> Self {
        Self::InvalidValue(format!("{key}: must be between {min} and {max}, got {got}"))
    }

    pub(crate) fn blank(key: &str) -> Self {
        Self::InvalidValue(format!("{key}: must not be empty"))
    }
}

pub type Result<T> = std::result::Result<T, SettingsError>;
