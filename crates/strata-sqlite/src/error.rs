//! Error types for the SQLite durable store.

use rusqlite::ErrorCode;
use strata_session::StoreError;
use thiserror::Error;

/// Errors raised while opening or maintaining the store.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Could not prepare the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Result type alias for store maintenance operations.
pub type Result<T> = std::result::Result<T, SqliteStoreError>;

/// Classify a SQLite error for the two-tier store.
pub(crate) fn classify(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            StoreError::TransientFailure(err.to_string())
        }
        Some(ErrorCode::ReadOnly) => StoreError::CapabilityDisabled(err.to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_and_locked_are_transient() {
        assert!(matches!(
            classify(failure(ffi::SQLITE_BUSY)),
            StoreError::TransientFailure(_)
        ));
        assert!(matches!(
            classify(failure(ffi::SQLITE_LOCKED)),
            StoreError::TransientFailure(_)
        ));
    }

    #[test]
    fn test_readonly_is_disabled() {
        assert!(matches!(
            classify(failure(ffi::SQLITE_READONLY)),
            StoreError::CapabilityDisabled(_)
        ));
    }

    #[test]
    fn test_other_errors_are_backend() {
        assert!(matches!(
            classify(rusqlite::Error::QueryReturnedNoRows),
            StoreError::Backend(_)
        ));
    }
}
