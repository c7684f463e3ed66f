//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the `ormapi` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine error, reported with its kind and issues.
    #[error(transparent)]
    Engine(#[from] ormapi_core::Error),

    /// Malformed query or payload argument.
    #[error(transparent)]
    Input(#[from] ormapi_proto::Error),

    /// Failed to read an `@file` argument.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to encode output.
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Machine-readable error report.
    pub fn report(&self) -> serde_json::Value {
        match self {
            CliError::Engine(err) => serde_json::json!({
                "error": err.kind(),
                "message": err.to_string(),
                "issues": err.issues(),
            }),
            other => serde_json::json!({
                "error": "cli",
                "message": other.to_string(),
            }),
        }
    }
}
