//! Error types for sensorlink-core

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the sensorlink-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The collector could not be reached (connect, timeout, protocol failure)
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The collector answered with a non-success status
    #[error("collector returned {status} for {path}: {body}")]
    Collector {
        path: String,
        status: u16,
        body: String,
    },

    /// A local artifact referenced by a report does not exist
    #[error("artifact not found: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// Worker runtime failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Whether a request that failed with this error may succeed if retried.
    ///
    /// Connect failures, timeouts and 5xx answers are transient; everything
    /// else (4xx, local I/O, bad JSON) is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http { source, .. } => {
                source.is_connect() || source.is_timeout() || source.is_request()
            }
            Error::Collector { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for sensorlink-core
pub type Result<T> = std::result::Result<T, Error>;
