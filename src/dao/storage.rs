//! Backend-neutral failure type of the document store.

use std::error::Error as StdError;

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

type BoxedSource = Box<dyn StdError + Send + Sync>;

/// Failure of a document store call.
///
/// `Unavailable` means the backend could not be reached or refused the call and the
/// supervisor may recover it. `Malformed` means a stored document no longer matches its
/// model, which no reconnect will fix.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: BoxedSource,
    },
    #[error("document `{key}` does not match its expected shape")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub fn unavailable(message: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn malformed(key: impl Into<String>, source: serde_json::Error) -> Self {
        StorageError::Malformed {
            key: key.into(),
            source,
        }
    }

    /// Whether retrying after a reconnect can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_errors_are_transient() {
        let io = std::io::Error::other("connection refused");
        assert!(StorageError::unavailable("couch down", io).is_transient());

        let decode = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = StorageError::malformed("team::1", decode);
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "document `team::1` does not match its expected shape");
    }
}
