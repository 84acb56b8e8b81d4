//! Error types shared by every AdLedger crate.

use thiserror::Error;

/// Errors raised by the shared types and configuration.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Configuration could not be loaded or saved
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A stored or configured name that matches no known variant
    #[error("unknown {kind} '{value}'")]
    UnknownVariant {
        /// What was being parsed
        kind: &'static str,
        /// The offending text
        value: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No XDG config directory on this system
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Malformed config file
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value outside its allowed range
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `sync.variance_threshold`
        field: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Result type alias using `LedgerError`.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
