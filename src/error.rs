//! Error types for daybook.
//!
//! Each component owns its error enum so callers can decide what is fatal for
//! a whole run (authentication, fetching) and what only affects one event
//! (mapping, per-day storage).

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the day-partitioned entry store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "corrupt JSON in {} (backed up to {}): {source}",
        .path.display(),
        .backup.display()
    )]
    Corruption {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt JSON in {} (left in place): {source}", .path.display())]
    Unparsable {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of the OAuth device-code flow and refresh exchange.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url} (HTTP {status}): {body}")]
    Endpoint {
        url: String,
        status: u16,
        body: String,
    },

    #[error("authorization server rejected the request: {code}{}", describe(.description))]
    Denied {
        code: String,
        description: Option<String>,
    },

    #[error("device code expired before the sign-in was completed")]
    DeviceCodeExpired,

    #[error("sign-in was cancelled")]
    Cancelled,

    /// Reading or writing the token file failed
    #[error("token file error: {0}")]
    Persist(#[from] StoreError),
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default()
}

/// Failures while reading events from the remote calendar.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("calendar request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("calendar API error {status} at {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("failed to decode calendar response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid calendar URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Failures converting one remote event into an entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("cannot parse {field} time {value:?}")]
    MalformedTimestamp { field: &'static str, value: String },
}

/// Crate-level error wrapping every component error.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Result type alias for daybook operations.
pub type Result<T> = std::result::Result<T, Error>;
