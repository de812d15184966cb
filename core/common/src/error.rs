//! Common error types for Sable.
//!
//! The engine reports failures as one of a fixed set of kinds; each kind is
//! a variant here so call sites can match on it directly.

use thiserror::Error;

/// Top-level error type for Sable operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrong or absent unlock secret.
    #[error("Invalid credential: {0}")]
    Credential(String),

    /// Operation invalid for the current lifecycle state.
    #[error("Invalid state: {0}")]
    State(String),

    /// The engine requires an administrative reset before further unlock attempts.
    #[error("Administratively locked: {0}")]
    AdminLocked(String),

    /// Referenced contact, volume, share, or object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attempted creation of something that already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Failure communicating with the network or backing storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not allowed for this principal.
    #[error("Not permitted: {0}")]
    Permission(String),

    /// A bounded wait expired without data or result.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A usage-rate or usage-limit guard rejected the request.
    #[error("License limit: {0}")]
    License(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether a failure is transient and worth retrying on the next
    /// loop iteration (the refresh task keeps running through these).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Timeout(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
