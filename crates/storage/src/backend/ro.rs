//! Read-only object store.
//!
//! This module provides a store implementation that wraps other
//! implementations and prevents remote writes from executing, but
//! indicating success on return.

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::{DomainCache, ObjectStore, PutResponse, RemoteStat, StoreHandle, validate_key};

/// Read-only object store.
///
/// Wraps another store and silently drops uploads and deletes, logging an
/// [`info event`](tracing::Event). Stat and domain lookups still reach the
/// wrapped store, so downloads keep working.
#[derive(Clone)]
pub struct ReadOnlyStore {
    inner: StoreHandle,
}
impl ReadOnlyStore {
    pub fn new(inner: StoreHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ObjectStore for ReadOnlyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    fn domain_cache(&self) -> &DomainCache {
        self.inner.domain_cache()
    }

    async fn upload(&self, key: &str, local_path: &Path) -> Result<PutResponse> {
        let key = validate_key(key)?;
        tracing::warn!(%key, path = %local_path.display(), "Skipping upload during read-only mode");
        Ok(PutResponse { key, hash: String::new() })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        tracing::warn!(key, "Skipping delete during read-only mode");
        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<RemoteStat> {
        self.inner.stat(key).await
    }

    async fn bucket_domains(&self) -> Result<Vec<String>> {
        self.inner.bucket_domains().await
    }

    fn public_url(&self, domain: &str, key: &str) -> String {
        self.inner.public_url(domain, key)
    }
}
