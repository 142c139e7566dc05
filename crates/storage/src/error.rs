//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// Status code the object store answers with when a key does not exist.
pub const STATUS_NOT_FOUND: u16 = 612;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Object does not exist in the bucket (status 612).
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The store answered with a non-success status.
    #[display("remote error ({status}): {body}")]
    Remote { status: u16, body: String },
    /// The bucket has no public domain bound to it (or it expired).
    #[display("no public domain found for bucket: {_0}")]
    DomainNotFound(#[error(not(source))] String),
    /// Local filesystem read/write failure.
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Transport failure before any response status was received.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Key is empty, contains NUL bytes or escapes the bucket root.
    #[display("invalid key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    /// The store answered successfully but the body could not be understood.
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Classify a non-success response status, mapping the store's
    /// not-found sentinel onto [`NotFound`](Self::NotFound).
    pub fn from_status(key: &str, status: u16, body: impl Into<String>) -> Self {
        match status {
            STATUS_NOT_FOUND => Self::NotFound(key.to_string()),
            status => Self::Remote { status, body: body.into() },
        }
    }

    /// Status code reported by the store, if the failure came with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(STATUS_NOT_FOUND),
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { status, .. } => *status >= 500,
            Self::Io(_) | Self::Network(_) | Self::BackendError(_) => true,
            _ => false,
        }
    }
}
