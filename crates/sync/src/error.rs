//! Sync Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Failures of the crates this one
//! drives are raised as a child of the matching kind, so the storage,
//! registry or settings error stays inspectable in the tree.

use derive_more::{Display, Error};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a sync failure.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An object store operation or transfer failed.
    #[display("cloud storage request failed")]
    Storage,
    /// The local metadata registry could not be read.
    #[display("could not read the local file registry")]
    Registry,
    /// Settings could not be loaded, or credentials are incomplete.
    #[display("cloud storage is not configured")]
    Config,
    /// The configured provider was not compiled in.
    #[display("unsupported storage provider: {_0}")]
    UnsupportedProvider(#[error(not(source))] String),
    /// At least one upload of a batch failed. Others may have completed.
    #[display("{failed} of {total} uploads failed")]
    BulkUpload { failed: usize, total: usize },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::BulkUpload { .. })
    }
}
