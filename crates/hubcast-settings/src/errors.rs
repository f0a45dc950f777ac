//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A settings value was invalid (e.g., out of range).
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

impl SettingsError {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::InvalidValue(_) => "invalid_value",
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
