//! Storage models.
//!
//! These types describe remote objects as reported by a store. None of them
//! are persisted; they are fetched per request and dropped afterwards.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Number of 100-nanosecond ticks in one millisecond.
pub const TICKS_PER_MILLI: i64 = 10_000;

/// Remote object metadata returned by [`stat()`](crate::ObjectStore::stat).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStat {
    /// Key the metadata was requested for.
    pub key: String,
    /// Last write time in 100-nanosecond units since the Unix epoch.
    pub put_time: i64,
    /// Object size in bytes.
    pub size: u64,
    /// Content hash (ETag) as reported by the store.
    pub hash: String,
    pub mime_type: Option<String>,
}
impl RemoteStat {
    pub fn new(key: impl Into<String>, put_time: i64) -> Self {
        Self {
            key: key.into(),
            put_time,
            size: 0,
            hash: String::new(),
            mime_type: None,
        }
    }

    /// Last write time coarsened to milliseconds, comparable with the
    /// `updatedAt` field of local file records. Rounds towards negative
    /// infinity.
    pub fn updated_at_millis(&self) -> i64 {
        self.put_time.div_euclid(TICKS_PER_MILLI)
    }

    /// Last write time as a timestamp, or `None` if out of range.
    pub fn modified(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.put_time) * 100).ok()
    }
}

/// Body returned by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PutResponse {
    pub key: String,
    pub hash: String,
}
