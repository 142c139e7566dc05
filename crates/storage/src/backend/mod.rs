//! Object store trait and implementations.
//!
//! This module defines the `ObjectStore` trait, which provides a unified
//! interface for the handful of bucket operations note synchronisation
//! needs, across different providers (Qiniu, S3-compatible services, an
//! in-memory store for tests).

#[cfg(any(test, feature = "mock"))]
mod mock;
mod qiniu;
mod ro;
#[cfg(feature = "s3")]
mod s3;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockStore;
pub use self::qiniu::{Endpoints, QiniuStore};
pub use self::ro::ReadOnlyStore;
#[cfg(feature = "s3")]
pub use self::s3::S3Store;
use crate::error::{ErrorKind, Result};
use crate::{DomainCache, PutResponse, RemoteStat, normalize_domain, validate_key};
use async_trait::async_trait;
use std::path::Path;

/// Percent-encode every segment of a key, keeping `/` separators intact.
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/').map(|segment| urlencoding::encode(segment).into_owned()).collect::<Vec<_>>().join("/")
}

/// Unified interface for object stores.
///
/// All operations are scoped to a single bucket fixed at construction time
/// and are asynchronous. Keys are validated with
/// [`validate_key`](crate::validate_key) before they reach the network.
///
/// # Errors
/// Every operation fails with [`Remote`](ErrorKind::Remote) when the store
/// answers with a non-success status, except that a missing object is always
/// reported as [`NotFound`](ErrorKind::NotFound) so callers can tell the two
/// apart without knowing the provider's status codes.
///
/// # Examples
///
/// ```no_run
/// use cloudmd_storage::{ObjectStore, error::{ErrorKind, Result}};
///
/// async fn remote_millis(store: &dyn ObjectStore, key: &str) -> Result<Option<i64>> {
///     match store.stat(key).await {
///         Ok(stat) => Ok(Some(stat.updated_at_millis())),
///         Err(e) if matches!(&*e, ErrorKind::NotFound(_)) => Ok(None),
///         Err(e) => Err(e),
///     }
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the configured provider, used for logging only.
    fn name(&self) -> &str;

    /// Bucket every operation is scoped to.
    fn bucket(&self) -> &str;

    /// Cache holding the bucket's resolved public domain.
    fn domain_cache(&self) -> &DomainCache;

    /// Upload the file at `local_path` under `key`, overwriting any existing
    /// object.
    async fn upload(&self, key: &str, local_path: &Path) -> Result<PutResponse>;

    /// Remove the object stored under `key`.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Get object metadata without downloading the object.
    async fn stat(&self, key: &str) -> Result<RemoteStat>;

    /// List the public domains bound to the bucket, preferred first.
    async fn bucket_domains(&self) -> Result<Vec<String>>;

    /// Compose the public download URL of `key` under a normalized `domain`.
    fn public_url(&self, domain: &str, key: &str) -> String {
        format!("{}/{}", domain.trim_end_matches('/'), encode_key(key))
    }

    /// Resolve a download URL for `key`.
    ///
    /// The bucket domain is looked up once via
    /// [`bucket_domains()`](Self::bucket_domains) and cached in
    /// [`domain_cache()`](Self::domain_cache); later calls don't query the
    /// store again. Fails with [`DomainNotFound`](ErrorKind::DomainNotFound)
    /// when the bucket has no usable domain.
    async fn download_link(&self, key: &str) -> Result<String> {
        let key = validate_key(key)?;
        let domain = match self.domain_cache().get().await {
            Some(domain) => domain,
            None => {
                let domains = self.bucket_domains().await?;
                let Some(first) = domains.iter().find(|domain| !domain.trim().is_empty()) else {
                    exn::bail!(ErrorKind::DomainNotFound(self.bucket().to_string()));
                };
                let domain = normalize_domain(first);
                tracing::debug!(store = self.name(), bucket = self.bucket(), %domain, "Resolved bucket domain");
                self.domain_cache().set(domain.clone()).await;
                domain
            },
        };
        Ok(self.public_url(&domain, &key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("note.md", "note.md")]
    #[case("My Note.md", "My%20Note.md")]
    #[case("journal/día 1.md", "journal/d%C3%ADa%201.md")]
    #[case("a?b#c.md", "a%3Fb%23c.md")]
    fn test_encode_key(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(encode_key(input), expected);
    }
}
