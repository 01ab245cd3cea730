//! Error types for the camrelay core library.

use thiserror::Error;

/// Result type alias using the camrelay core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is missing, malformed or out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file could not be parsed.
    #[error("Failed to parse config file {path}: {reason}")]
    ConfigFile { path: String, reason: String },
}
