//! Reasons a parse strategy produced nothing.

use thiserror::Error;

/// Why a strategy yielded no items. Always recoverable: the cascade moves
/// on to the next strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseMiss {
    /// The content does not have the shape this strategy looks for.
    #[error("no match: {0}")]
    NoMatch(String),

    /// The shape was recognised but could not be decoded.
    #[error("malformed content: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ParseMiss {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Result alias for parse strategies.
pub type ParseResult<T> = std::result::Result<Vec<T>, ParseMiss>;
