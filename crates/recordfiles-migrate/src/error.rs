//! Error types for recordfiles-migrate.
//!
//! Errors carry a stable `RF-XXX` code. Per-record failures are captured by
//! the transfer layer and reported; everything else aborts the run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while exporting or importing record files.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration (RF-001).
    #[error("[RF-001] Configuration error: {0}")]
    Config(String),

    /// Local filesystem error (RF-002).
    #[error("[RF-002] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level HTTP failure (RF-003).
    #[error("[RF-003] HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store rejected the session (RF-004).
    #[error("[RF-004] Authentication failed: {0}")]
    Authentication(String),

    /// The remote store is throttling requests (RF-005).
    #[error("[RF-005] Rate limited, retry after {0}s")]
    RateLimit(u64),

    /// Structured error returned by the remote store (RF-006).
    #[error("[RF-006] Remote store error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Store-specific error code (e.g. `DUPLICATE_VALUE`).
        code: Option<String>,
        /// Human readable message extracted from the error payload.
        message: String,
    },

    /// Malformed query or unexpected query response (RF-007).
    #[error("[RF-007] Query error: {0}")]
    Query(String),

    /// Payload download failed (RF-008).
    #[error("[RF-008] Transfer failed: {0}")]
    Transfer(String),

    /// CSV read/write failure (RF-009).
    #[error("[RF-009] CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML config parse failure (RF-010).
    #[error("[RF-010] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encode/decode failure (RF-011).
    #[error("[RF-011] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A batch carried columns that the manifest header does not have (RF-012).
    #[error("[RF-012] Manifest schema drift: {0}")]
    SchemaDrift(String),

    /// Manifest content does not match what the importer needs (RF-013).
    #[error("[RF-013] Manifest error: {0}")]
    Manifest(String),

    /// Local payload file referenced by a manifest row is missing (RF-014).
    #[error("[RF-014] Payload file not found: {}", .0.display())]
    MissingPayload(PathBuf),

    /// A transfer worker panicked or was cancelled (RF-015).
    #[error("[RF-015] Worker error: {0}")]
    Worker(String),
}

impl Error {
    /// Returns the error code (e.g., "RF-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "RF-001",
            Self::Io(_) => "RF-002",
            Self::Http(_) => "RF-003",
            Self::Authentication(_) => "RF-004",
            Self::RateLimit(_) => "RF-005",
            Self::Api { .. } => "RF-006",
            Self::Query(_) => "RF-007",
            Self::Transfer(_) => "RF-008",
            Self::Csv(_) => "RF-009",
            Self::Yaml(_) => "RF-010",
            Self::Json(_) => "RF-011",
            Self::SchemaDrift(_) => "RF-012",
            Self::Manifest(_) => "RF-013",
            Self::MissingPayload(_) => "RF-014",
            Self::Worker(_) => "RF-015",
        }
    }

    /// Returns true for local preconditions that must halt the run
    /// (disk failures, missing payloads, broken manifests).
    #[must_use]
    pub const fn is_fatal_local(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Csv(_)
                | Self::SchemaDrift(_)
                | Self::Manifest(_)
                | Self::MissingPayload(_)
                | Self::Worker(_)
        )
    }

    /// Text placed in a result row's `error` field.
    ///
    /// Store errors yield the store's own message without the code prefix.
    #[must_use]
    pub fn record_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::Transfer(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
