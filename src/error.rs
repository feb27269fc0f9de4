//! Error types for ingestion, disk caching, lookups and configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures that abort an ingestion cycle.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Transport-level failure talking to the remote source.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("remote source answered HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("remote fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The payload is not a readable zip container.
    #[error("corrupt archive: {0}")]
    ArchiveFormat(String),

    #[error("no dated dataset file in archive")]
    NoDatedFile,

    #[error("malformed dataset: {0}")]
    Parse(String),

    #[error("ingestion cycle cancelled")]
    Cancelled,

    /// A blocking worker panicked or was aborted.
    #[error("ingestion worker failed: {0}")]
    Worker(String),
}

impl From<zip::result::ZipError> for IngestError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ArchiveFormat(err.to_string())
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker(err.to_string())
    }
}

/// Disk cache failures. Never fatal to a cycle: callers log and degrade.
#[derive(Debug, Error)]
pub enum DiskError {
    #[error("disk cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DiskError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Detail lookup miss, surfaced to readers only.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("record {id} not found")]
pub struct NotFoundError {
    pub id: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be HH:MM, got {value:?}")]
    FetchTime { key: &'static str, value: String },

    #[error("{key} must be a positive number of seconds, got {value:?}")]
    Timeout { key: &'static str, value: String },

    #[error("{key} must be a socket address, got {value:?}")]
    BindAddr { key: &'static str, value: String },
}
