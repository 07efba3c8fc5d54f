//! Failures of the CouchDB document store.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Errors raised while talking to CouchDB. `target` is the database or document path.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    #[error("invalid CouchDB base URL `{url}`")]
    InvalidBaseUrl { url: String },
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The request never produced a response (refused, reset or timed out).
    #[error("CouchDB request to `{target}` failed{}", timeout_suffix(.timed_out))]
    Transport {
        target: String,
        timed_out: bool,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected CouchDB status {status} for `{target}`")]
    UnexpectedStatus { target: String, status: StatusCode },
    /// Concurrent writers kept moving the revision of `doc_id`.
    #[error("document `{doc_id}` still conflicted after {attempts} attempts")]
    RevisionConflict { doc_id: String, attempts: usize },
    #[error("failed to decode CouchDB response for `{target}`")]
    Decode {
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

fn timeout_suffix(timed_out: &bool) -> &'static str {
    if *timed_out { " (timed out)" } else { "" }
}

impl CouchDaoError {
    pub(super) fn transport(target: impl Into<String>, source: reqwest::Error) -> Self {
        CouchDaoError::Transport {
            target: target.into(),
            timed_out: source.is_timeout(),
            source,
        }
    }
}

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
