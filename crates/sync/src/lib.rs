//! Note synchronisation between the local library and a cloud bucket.
//!
//! The editor sends [`SyncRequest`]s to a [`SyncService`] and gets
//! [`SyncEvent`]s back. Each request is handled by a [`Reconciler`], which
//! decides the direction of a transfer from the remote write time and the
//! local registry, and a [`Transfer`], which moves the bytes.
//!
//! # Example
//!
//! ```no_run
//! use cloudmd_sync::{FileSettings, ProviderConnector, SyncEvent, SyncRequest, SyncService};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (request_tx, request_rx) = mpsc::channel(16);
//! let (event_tx, mut event_rx) = mpsc::channel(16);
//! let service = SyncService::new(FileSettings::default(), ProviderConnector);
//! tokio::spawn(service.run(request_rx, event_tx));
//!
//! request_tx.send(SyncRequest::UploadAll).await.unwrap();
//! while let Some(event) = event_rx.recv().await {
//!     if let SyncEvent::FilesUploaded { count } = event {
//!         println!("uploaded {count} notes");
//!     }
//! }
//! # }
//! ```

pub mod error;
mod events;
mod locks;
mod policy;
mod service;
mod transfer;

pub use crate::events::{DownloadStatus, SyncEvent, SyncRequest};
pub use crate::locks::{KeyGuard, KeyLocks};
pub use crate::policy::{Decision, Reconciler, decide};
pub use crate::service::{Connector, FileSettings, ProviderConnector, SettingsSource, SyncService};
pub use crate::transfer::Transfer;
