//! Deciding which way a note should travel, and carrying it out.

use crate::error::{ErrorKind, Result};
use crate::events::DownloadStatus;
use crate::locks::KeyLocks;
use crate::transfer::Transfer;
use cloudmd_registry::Registry;
use cloudmd_storage::error::ErrorKind as StorageErrorKind;
use cloudmd_storage::{PutResponse, TICKS_PER_MILLI, validate_key};
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::path::Path;
use tracing::instrument;

/// What a download request should do once both timestamps are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Download,
    UpToDate,
}

/// Compare the store's write time (100-ns ticks) against the local record's
/// `updatedAt` (milliseconds).
///
/// The remote copy wins only when it is strictly newer, or when the note has
/// never been saved locally (no timestamp, or zero).
///
/// ```
/// use cloudmd_sync::{Decision, decide};
/// assert_eq!(decide(20_000_000, Some(1_000)), Decision::Download);
/// assert_eq!(decide(20_000_000, Some(2_000)), Decision::UpToDate);
/// assert_eq!(decide(0, None), Decision::Download);
/// ```
pub fn decide(remote_put_time: i64, local_updated_at: Option<i64>) -> Decision {
    let server_updated_at = remote_put_time.div_euclid(TICKS_PER_MILLI);
    match local_updated_at {
        Some(local) if local != 0 && server_updated_at <= local => Decision::UpToDate,
        _ => Decision::Download,
    }
}

/// Runs sync requests against one store.
#[derive(Clone)]
pub struct Reconciler {
    transfer: Transfer,
    locks: KeyLocks,
}
impl Reconciler {
    pub fn new(transfer: Transfer, locks: KeyLocks) -> Self {
        Self { transfer, locks }
    }

    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    /// Replace the local copy of note `id` with the remote object `key` if
    /// the remote one is newer.
    ///
    /// A missing remote object is an outcome ([`DownloadStatus::NoFile`]),
    /// not an error. A note absent from `registry` counts as never saved.
    #[instrument(skip(self, registry, path))]
    pub async fn download(&self, registry: &Registry, key: &str, path: &Path, id: &str) -> Result<DownloadStatus> {
        let key = validate_key(key).or_raise(|| ErrorKind::Storage)?;
        let _guard = self.locks.lock(&key).await;
        let stat = match self.transfer.store().stat(&key).await {
            Ok(stat) => stat,
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => {
                tracing::debug!("Remote object missing");
                return Ok(DownloadStatus::NoFile);
            },
            Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
        };
        let local_updated_at = registry.get(id).and_then(|record| record.updated_at);
        let decision = decide(stat.put_time, local_updated_at);
        tracing::debug!(
            remote = stat.updated_at_millis(),
            local = ?local_updated_at,
            ?decision,
            "Compared remote and local timestamps"
        );
        match decision {
            Decision::Download => {
                self.transfer.download(&key, path).await.or_raise(|| ErrorKind::Storage)?;
                Ok(DownloadStatus::DownloadSuccess)
            },
            Decision::UpToDate => Ok(DownloadStatus::NoNewFile),
        }
    }

    /// Upload a note unconditionally.
    pub async fn upload(&self, key: &str, path: &Path) -> Result<PutResponse> {
        let key = validate_key(key).or_raise(|| ErrorKind::Storage)?;
        let _guard = self.locks.lock(&key).await;
        self.transfer.upload(&key, path).await.or_raise(|| ErrorKind::Storage)
    }

    /// Upload every note in `registry` under `<title>.md`, all at once.
    ///
    /// Every upload runs to completion even when others fail. The count is
    /// only reported when all of them succeeded; otherwise a single
    /// [`BulkUpload`](ErrorKind::BulkUpload) error is returned, although the
    /// successful uploads have landed remotely.
    #[instrument(skip_all, fields(total = registry.len()))]
    pub async fn upload_all(&self, registry: &Registry) -> Result<usize> {
        let total = registry.len();
        let mut uploads: FuturesUnordered<_> = registry
            .files()
            .map(|record| async move {
                let key = record.remote_key();
                let result = self.upload(&key, &record.path).await;
                (key, result)
            })
            .collect();
        let mut failed = 0;
        while let Some((key, result)) = uploads.next().await {
            if let Err(e) = result {
                tracing::warn!(%key, error = ?e, "Upload failed");
                failed += 1;
            }
        }
        if failed > 0 {
            exn::bail!(ErrorKind::BulkUpload { failed, total });
        }
        tracing::info!(count = total, "Uploaded all notes");
        Ok(total)
    }
}
