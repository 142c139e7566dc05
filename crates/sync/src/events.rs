//! Messages exchanged with the editor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Work requested by the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncRequest {
    /// Upload the active note.
    UploadFile { key: String, path: PathBuf },
    /// Fetch a note if the remote copy is newer than the local one.
    DownloadFile { key: String, path: PathBuf, id: String },
    /// Upload every note in the registry.
    UploadAll,
    /// The settings window saved new settings.
    ConfigSaved,
}

/// Outcome of a download request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadStatus {
    /// The remote copy was newer (or the local one had never been saved) and
    /// replaced the local file.
    DownloadSuccess,
    /// The local copy is at least as recent; nothing was transferred.
    NoNewFile,
    /// The object does not exist remotely.
    NoFile,
}

/// Notifications sent back to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncEvent {
    ActiveFileUploaded,
    FileDownloaded { status: DownloadStatus, id: String },
    FilesUploaded { count: usize },
    /// Brackets long-running work so the editor can show a spinner.
    LoadingStatus { loading: bool },
    /// A request failed. `message` is meant for the user.
    SyncFailed { message: String },
    /// Whether sync affordances should be enabled, after settings changed.
    SyncAvailability { enabled: bool },
}
