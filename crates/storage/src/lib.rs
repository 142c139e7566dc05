//! Object storage client for synchronising notes with a cloud bucket.
//!
//! Everything remote goes through the [`ObjectStore`] trait. The default
//! implementation talks to a Qiniu-compatible object store; an S3 backend is
//! available behind the `s3` feature and an in-memory one behind `mock`.

pub mod backend;
mod domain;
pub mod error;
mod key;
mod models;

pub use crate::backend::ObjectStore;
pub use crate::domain::{DomainCache, normalize as normalize_domain};
pub use crate::key::validate as validate_key;
pub use crate::models::{PutResponse, RemoteStat, TICKS_PER_MILLI};
use std::sync::Arc;

pub type StoreHandle = Arc<dyn ObjectStore + Send + Sync>;
