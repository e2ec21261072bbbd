//! Error types for the sync engine.
//!
//! Only validation and cipher failures are errors in the ordinary sense.
//! Disagreements between local and imported data are resolved by the merge
//! resolver and never surface here.

use crate::{CollectionName, RecordId, SchemaVersion};
use thiserror::Error;

/// All possible errors from the sync engine.
#[derive(Debug, Error)]
pub enum Error {
    // Validation errors
    #[error("invalid snapshot format: {0}")]
    Format(String),

    #[error(
        "snapshot schema version {imported} is newer than supported version {local}; \
         update the application to import this file"
    )]
    UnsupportedSchemaVersion {
        imported: SchemaVersion,
        local: SchemaVersion,
    },

    #[error(transparent)]
    Cipher(#[from] CipherError),

    // Apply errors
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization failed: {0}")]
    Serialization(String),

    // Session errors
    #[error("invalid import session transition: cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
}

/// Failures of the passphrase cipher.
///
/// Wrong passwords and corrupted containers both surface as
/// [`CipherError::Authentication`]; the two cannot be told apart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("password must not be empty")]
    EmptyPassword,

    #[error("decryption failed: wrong password or corrupted container")]
    Authentication,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// Failures reported by a record store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("collection not found: {0}")]
    UnknownCollection(CollectionName),

    #[error("malformed record '{id}' in {collection}: {reason}")]
    Malformed {
        collection: CollectionName,
        id: RecordId,
        reason: String,
    },

    #[error("store i/o error: {0}")]
    Io(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for record store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnsupportedSchemaVersion {
            imported: 5,
            local: 2,
        };
        assert!(err.to_string().contains("update the application"));

        let err = Error::Cipher(CipherError::Authentication);
        assert_eq!(
            err.to_string(),
            "decryption failed: wrong password or corrupted container"
        );

        let err = StoreError::Malformed {
            collection: "hours".into(),
            id: "h1".into(),
            reason: "missing id".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed record 'h1' in hours: missing id"
        );
    }

    #[test]
    fn store_error_converts_into_engine_error() {
        let err: Error = StoreError::UnknownCollection("nope".into()).into();
        assert!(matches!(err, Error::Store(StoreError::UnknownCollection(_))));
    }
}
