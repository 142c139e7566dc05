//! Public bucket domain handling.

use tokio::sync::RwLock;

/// Normalizes a bucket domain so it can prefix a download URL.
///
/// Domains without an `http`/`https` scheme get `http://` prepended, and
/// trailing slashes are removed.
///
/// ```
/// use cloudmd_storage::normalize_domain;
/// assert_eq!(normalize_domain("cdn.example.com"), "http://cdn.example.com");
/// assert_eq!(normalize_domain("https://cdn.example.com/"), "https://cdn.example.com");
/// ```
pub fn normalize(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    match domain.starts_with("http://") || domain.starts_with("https://") {
        true => domain.to_string(),
        false => format!("http://{domain}"),
    }
}

/// Resolved public domain of a bucket, cached for the lifetime of the store
/// that owns it.
///
/// A store is tied to one set of credentials and one bucket, so the cache
/// only needs clearing when the bucket's domain bindings change remotely.
/// Callers switching credentials or buckets build a new store instead.
#[derive(Debug, Default)]
pub struct DomainCache {
    domain: RwLock<Option<String>>,
}
impl DomainCache {
    pub async fn get(&self) -> Option<String> {
        self.domain.read().await.clone()
    }

    pub async fn set(&self, domain: impl Into<String>) {
        *self.domain.write().await = Some(domain.into());
    }

    /// Forget the cached domain; the next download link re-queries the store.
    pub async fn invalidate(&self) {
        self.domain.write().await.take();
    }
}
