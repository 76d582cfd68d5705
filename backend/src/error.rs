//! Error types shared by the offline subsystem

use std::sync::Arc;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by downloads, the offline store and the remote fetcher
#[derive(Debug, Error)]
pub enum Error {
    /// An identifier was zero; rejected before any state is touched
    #[error("invalid {field}: {value} (expected a positive integer)")]
    InvalidId { field: &'static str, value: u32 },

    /// The remote API answered with a non-success status
    #[error("request to {url} failed with HTTP status {status}")]
    Http { status: u16, url: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The byte transfer finished without leaving a usable file behind
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// A conflicting operation for the same content key is still running
    #[error("another operation is in progress for {0}")]
    Busy(String),

    /// One or more tafsir ids of a surah-level request failed
    #[error(
        "failed to download tafsir for surah {surah_id}: ids {}",
        join_ids(tafsir_ids)
    )]
    TafsirFailed { surah_id: u32, tafsir_ids: Vec<u32> },

    /// A background operation panicked or was aborted
    #[error("background task failed: {0}")]
    Task(String),

    /// Outcome of an in-flight operation shared by every caller that joined it
    #[error(transparent)]
    Shared(Arc<Error>),
}

impl Error {
    /// Look through `Shared` wrappers to the error that actually happened.
    pub fn root(&self) -> &Error {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.root(), Self::Busy(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Self::InvalidId { .. })
    }
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
