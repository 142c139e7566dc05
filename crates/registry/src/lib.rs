//! Local metadata registry.
//!
//! The editor keeps one JSON document describing every note it knows about:
//! its id, title, local path and when it was last modified locally. The sync
//! core only reads `updatedAt` (to decide whether a remote copy is newer) and
//! `title` (to derive the remote key); everything else belongs to the editor.

pub mod error;
mod models;
mod repo;

pub use crate::models::{FileRecord, NOTE_EXTENSION};
pub use crate::repo::Registry;
