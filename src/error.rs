//! Centralized error types for attachsort.

use std::path::PathBuf;
use thiserror::Error;

use crate::digest::Fingerprint;

/// All errors produced by the attachsort library.
#[derive(Error, Debug)]
pub enum SortError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The manifest file exists but cannot be understood.
    ///
    /// Always fatal: continuing would re-categorize every known attachment as new.
    #[error("Corrupt manifest '{path}': {reason}")]
    ManifestCorrupt { path: PathBuf, reason: String },

    /// A fingerprint was recorded twice. Indicates a caller bug.
    #[error("Fingerprint {0} is already recorded in the manifest")]
    DuplicateKey(Fingerprint),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The mail API answered with an unexpected status.
    #[error("{context} failed with status {status}: {body}")]
    Api {
        status: u16,
        context: String,
        body: String,
    },

    /// The mail API answered successfully but with unusable content.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested mail folder does not exist in the mailbox.
    #[error("Mail folder not found: {0}")]
    FolderNotFound(String),

    /// No credential source produced a usable value.
    #[error("Credential resolution failed: {0}")]
    Credentials(String),

    /// A configuration value is missing or invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, SortError>`.
pub type Result<T> = std::result::Result<T, SortError>;

impl SortError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an `Api` variant, keeping only the head of the response body.
    pub fn api(status: u16, context: impl Into<String>, body: &str) -> Self {
        Self::Api {
            status,
            context: context.into(),
            body: body.chars().take(200).collect(),
        }
    }
}
