//! In-memory object store for testing.

use crate::error::{ErrorKind, Result};
use crate::{DomainCache, ObjectStore, PutResponse, RemoteStat, TICKS_PER_MILLI, validate_key};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

struct Object {
    put_time: i64,
    data: Vec<u8>,
}

/// In-memory object store for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation. On top
/// of plain storage it lets tests pin write times, fail specific keys with a
/// given status, and count how often the bucket domain was looked up.
///
/// # Examples
///
/// ```ignore
/// // Requires the `mock` feature.
/// use cloudmd_storage::{ObjectStore, backend::MockStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockStore::with_objects([("a.md", b"# Remote".to_vec())]).with_domains(["cdn.example.com"]);
/// store.set_put_time("a.md", 20_000_000).await;
/// assert_eq!(store.stat("a.md").await?.updated_at_millis(), 2_000);
/// assert_eq!(store.download_link("a.md").await?, "http://cdn.example.com/a.md");
/// # Ok(())
/// # }
/// ```
pub struct MockStore {
    bucket: String,
    objects: RwLock<HashMap<String, Object>>,
    domains: Vec<String>,
    failures: RwLock<HashMap<String, (u16, String)>>,
    domain_queries: AtomicUsize,
    domain: DomainCache,
}

impl MockStore {
    /// Create a mock store pre-populated with objects, all written "now".
    ///
    /// Panics if any key fails validation. If test setup is wrong, then test
    /// should not pass.
    pub fn with_objects(objects: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let now = now_ticks();
        let mut map = HashMap::new();
        for (key, data) in objects {
            let key = key.into();
            let Ok(validated) = validate_key(&key) else {
                // The panic here is DELIBERATE. There is no error result.
                panic!("MockStore::with_objects: invalid key {key}");
            };
            map.insert(validated, Object { put_time: now, data: data.into() });
        }
        Self {
            bucket: "mock".to_string(),
            objects: RwLock::new(map),
            domains: Vec::new(),
            failures: RwLock::new(HashMap::new()),
            domain_queries: AtomicUsize::new(0),
            domain: DomainCache::default(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Domains returned by [`bucket_domains()`](ObjectStore::bucket_domains).
    pub fn with_domains(mut self, domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Pin the write time (100-ns units) of an existing object.
    pub async fn set_put_time(&self, key: &str, put_time: i64) {
        if let Some(object) = self.objects.write().await.get_mut(key) {
            object.put_time = put_time;
        }
    }

    /// Make every operation on `key` fail with `status`. Status 612 behaves
    /// exactly like a missing object.
    pub async fn fail_key(&self, key: impl Into<String>, status: u16, body: impl Into<String>) {
        self.failures.write().await.insert(key.into(), (status, body.into()));
    }

    /// Contents of a stored object.
    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).map(|object| object.data.clone())
    }

    /// Keys of every stored object, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// How many times the bucket domain list was requested.
    pub fn domain_queries(&self) -> usize {
        self.domain_queries.load(Ordering::SeqCst)
    }

    async fn check_failure(&self, key: &str) -> Result<()> {
        if let Some((status, body)) = self.failures.read().await.get(key) {
            exn::bail!(ErrorKind::from_status(key, *status, body.clone()));
        }
        Ok(())
    }
}
impl Default for MockStore {
    fn default() -> Self {
        let objects: [(&str, Vec<u8>); 0] = [];
        Self::with_objects(objects)
    }
}

fn now_ticks() -> i64 {
    let now = OffsetDateTime::now_utc();
    let millis = i64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX / TICKS_PER_MILLI);
    millis * TICKS_PER_MILLI
}

#[async_trait]
impl ObjectStore for MockStore {
    fn name(&self) -> &str {
        "mock"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn domain_cache(&self) -> &DomainCache {
        &self.domain
    }

    async fn upload(&self, key: &str, local_path: &Path) -> Result<PutResponse> {
        let key = validate_key(key)?;
        self.check_failure(&key).await?;
        let data = tokio::fs::read(local_path).await.map_err(ErrorKind::Io)?;
        let hash = format!("{:08x}", data.len());
        self.objects.write().await.insert(key.clone(), Object { put_time: now_ticks(), data });
        Ok(PutResponse { key, hash })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = validate_key(key)?;
        self.check_failure(&key).await?;
        match self.objects.write().await.remove(&key) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(key)),
        }
    }

    async fn stat(&self, key: &str) -> Result<RemoteStat> {
        let key = validate_key(key)?;
        self.check_failure(&key).await?;
        let guard = self.objects.read().await;
        let Some(object) = guard.get(&key) else {
            exn::bail!(ErrorKind::NotFound(key));
        };
        Ok(RemoteStat {
            size: object.data.len() as u64,
            hash: format!("{:08x}", object.data.len()),
            ..RemoteStat::new(key.clone(), object.put_time)
        })
    }

    async fn bucket_domains(&self) -> Result<Vec<String>> {
        self.domain_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.domains.clone())
    }
}
