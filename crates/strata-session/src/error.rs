//! Error types for session and storage operations.

/// Error type for session operations surfaced to request-handling code.
///
/// Storage-tier failures never appear here; they are absorbed by
/// [`TwoTierStore`](crate::TwoTierStore) and reported through
/// [`SaveOutcome`](crate::SaveOutcome) instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Stored bytes could not be decoded into a payload.
    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),

    /// Mapping read of a key that is not in the payload.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Attempt to remove a key the session depends on.
    #[error("Key may not be removed: {0}")]
    ProtectedKey(String),

    /// A value written to `expiration` is not an RFC 3339 timestamp.
    #[error("Invalid expiration value: {0}")]
    InvalidExpiration(String),

    /// Mutation attempted after the session was terminated.
    #[error("Session has been terminated")]
    Terminated,

    /// A plain value could not be converted to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failure reported by a durable store capability.
///
/// Every variant is non-fatal to the caller of the two-tier store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend is temporarily unable to complete the call (busy, timeout).
    #[error("Transient failure: {0}")]
    TransientFailure(String),

    /// The backend has writes disabled (read-only mode, maintenance).
    #[error("Capability disabled: {0}")]
    CapabilityDisabled(String),

    /// Any other backend error.
    #[error("Backend error: {0}")]
    Backend(String),
}
