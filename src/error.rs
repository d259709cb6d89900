//! Error types for the cache worker
//!
//! Manager and store operations return `WorkerResult<T>`. Network failures
//! surface as `FetchError` at the fetcher seam and are wrapped into
//! `WorkerError` where an operation gives up on them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can occur while fetching from the network
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The network could not be reached at all
    #[error("Network unreachable: {0}")]
    Unreachable(String),
}

/// All errors that can occur in the cache worker
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A seed URL could not be fetched during install
    #[error("Failed to fetch seed {url}: {source}")]
    SeedFetch {
        url: String,
        #[source]
        source: FetchError,
    },

    /// A seed URL answered with a non-success status during install
    #[error("Seed {url} returned status {status}")]
    SeedStatus { url: String, status: u16 },

    /// Activation was requested for a generation that was never installed
    #[error("Generation '{0}' is not installed")]
    NotInstalled(String),

    /// No cached entry and the network fetch failed
    #[error("Offline and no cached response for {url}: {source}")]
    Offline {
        url: String,
        #[source]
        source: FetchError,
    },

    /// Generation names become directory names, so they are restricted
    #[error("Invalid generation name: '{0}'")]
    InvalidGeneration(String),

    /// Only GET requests can be stored
    #[error("Cannot store a {0} request; only GET is cacheable")]
    UnsupportedMethod(String),

    /// A URL could not be parsed or resolved
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The dictionary dataset answered with a non-success status
    #[error("Dictionary dataset returned status {0}")]
    DatasetStatus(u16),

    /// The dictionary dataset body was not valid JSON
    #[error("Failed to parse dictionary dataset: {0}")]
    DatasetParse(#[source] serde_json::Error),

    /// Network failure outside of install and request mediation
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Filesystem error in the generation store
    #[error("I/O error while {context} ({path}): {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored entry metadata could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkerError {
    /// Wraps an I/O error with what the store was doing and where
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}
