//! Protocol error types.

use thiserror::Error;

/// Errors raised while building or decoding protocol types.
#[derive(Debug, Error)]
pub enum Error {
    /// A query component could not be parsed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// JSON decoding failed.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}
