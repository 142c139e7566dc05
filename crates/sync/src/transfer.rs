//! Moving note contents between disk and the bucket.

use cloudmd_storage::error::{ErrorKind, Result};
use cloudmd_storage::{PutResponse, StoreHandle};
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::CACHE_CONTROL;
use std::ffi::OsString;
use std::path::Path;
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Uploads through the object store, and downloads over plain HTTP from the
/// bucket's public domain.
#[derive(Clone)]
pub struct Transfer {
    store: StoreHandle,
    http: Client,
}
impl Transfer {
    pub fn new(store: StoreHandle, http: Client) -> Self {
        Self { store, http }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    #[instrument(skip(self), fields(store = self.store.name(), path = %local_path.display()))]
    pub async fn upload(&self, key: &str, local_path: &Path) -> Result<PutResponse> {
        let response = self.store.upload(key, local_path).await?;
        tracing::info!(key = %response.key, hash = %response.hash, "Uploaded note");
        Ok(response)
    }

    /// Download `key` to `destination`, returning the number of bytes
    /// written.
    ///
    /// The body is written to a uniquely named temporary file next to
    /// `destination` and renamed over it once complete. On failure
    /// `destination` is untouched and the temporary file is removed.
    #[instrument(skip(self), fields(store = self.store.name(), destination = %destination.display()))]
    pub async fn download(&self, key: &str, destination: &Path) -> Result<u64> {
        let link = self.store.download_link(key).await?;
        let url = cache_busted(&link, now_millis());
        let response = self
            .http
            .get(&url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| ErrorKind::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            exn::bail!(ErrorKind::Remote { status: status.as_u16(), body });
        }

        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
        // Unique per download, removed on drop unless persisted.
        let (file, temp) = temporary_in(parent, destination).map_err(ErrorKind::Io)?.into_parts();
        let written = write_body(response, File::from_std(file)).await?;
        if let Ok(existing) = tokio::fs::metadata(destination).await {
            tokio::fs::set_permissions(&temp, existing.permissions()).await.map_err(ErrorKind::Io)?;
        }
        temp.persist(destination).map_err(|e| ErrorKind::Io(e.error))?;
        tracing::info!(key, size = written, "Downloaded note");
        Ok(written)
    }
}

async fn write_body(response: reqwest::Response, mut file: File) -> Result<u64> {
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ErrorKind::Network(e.to_string()))?;
        file.write_all(&chunk).await.map_err(ErrorKind::Io)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(ErrorKind::Io)?;
    Ok(written)
}

/// Defeat CDN caching so a note saved moments ago isn't served stale.
fn cache_busted(link: &str, millis: i64) -> String {
    let separator = if link.contains('?') { '&' } else { '?' };
    format!("{link}{separator}timestamp={millis}")
}

fn now_millis() -> i64 {
    i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn temporary_in(dir: &Path, destination: &Path) -> std::io::Result<NamedTempFile> {
    let mut prefix = OsString::from(".");
    prefix.push(destination.file_name().unwrap_or_default());
    prefix.push(".");
    tempfile::Builder::new().prefix(&prefix).suffix(".download").tempfile_in(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudmd_storage::ObjectStore;
    use cloudmd_storage::backend::MockStore;
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn transfer(store: MockStore) -> (Transfer, Arc<MockStore>) {
        let store = Arc::new(store);
        (Transfer::new(store.clone(), Client::new()), store)
    }

    #[rstest]
    #[case("http://cdn.example.com/a.md", "http://cdn.example.com/a.md?timestamp=42")]
    #[case("http://cdn.example.com/a.md?e=1&token=x", "http://cdn.example.com/a.md?e=1&token=x&timestamp=42")]
    fn test_cache_busted(#[case] link: &str, #[case] expected: &str) {
        assert_eq!(cache_busted(link, 42), expected);
    }

    #[tokio::test]
    async fn test_upload_then_stat_is_recent() {
        let (transfer, store) = transfer(MockStore::default());
        let file = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), "# Groceries").await.unwrap();

        let issued = now_millis();
        let response = transfer.upload("Groceries.md", file.path()).await.unwrap();
        assert_eq!(response.key, "Groceries.md");
        assert!(store.stat("Groceries.md").await.unwrap().updated_at_millis() >= issued);
    }

    #[tokio::test]
    async fn test_download_writes_destination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/My%20Note.md"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Remote"))
            .expect(1)
            .mount(&server)
            .await;
        let (transfer, _) = transfer(MockStore::default().with_domains([server.uri()]));
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("notes").join("My Note.md");

        let written = transfer.download("My Note.md", &destination).await.unwrap();
        assert_eq!(written, 8);
        assert_eq!(tokio::fs::read_to_string(&destination).await.unwrap(), "# Remote");

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].url.query().unwrap().starts_with("timestamp="));
    }

    #[tokio::test]
    async fn test_download_replaces_existing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("new"))
            .mount(&server)
            .await;
        let (transfer, _) = transfer(MockStore::default().with_domains([server.uri()]));
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a.md");
        tokio::fs::write(&destination, "old contents").await.unwrap();

        transfer.download("a.md", &destination).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&destination).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_download_failure_leaves_destination_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;
        let (transfer, _) = transfer(MockStore::default().with_domains([server.uri()]));
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a.md");
        tokio::fs::write(&destination, "local").await.unwrap();

        let err = transfer.download("a.md", &destination).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Remote { status: 404, body } if body == "gone"));
        assert_eq!(tokio::fs::read_to_string(&destination).await.unwrap(), "local");
        assert_eq!(entries(dir.path()), ["a.md"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_downloads_to_one_destination_do_not_interleave() {
        let server = MockServer::start().await;
        let first = "1".repeat(64 * 1024);
        let second = "2".repeat(32 * 1024);
        Mock::given(method("GET"))
            .and(path("/one.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string(first.clone()).set_delay(Duration::from_millis(50)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/two.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string(second.clone()).set_delay(Duration::from_millis(50)))
            .mount(&server)
            .await;
        let (transfer, _) = transfer(MockStore::default().with_domains([server.uri()]));
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a.md");

        let (one, two) =
            tokio::join!(transfer.download("one.md", &destination), transfer.download("two.md", &destination));
        one.unwrap();
        two.unwrap();
        let contents = tokio::fs::read_to_string(&destination).await.unwrap();
        assert!(contents == first || contents == second);
        assert_eq!(entries(dir.path()), ["a.md"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_keeps_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("new"))
            .mount(&server)
            .await;
        let (transfer, _) = transfer(MockStore::default().with_domains([server.uri()]));
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a.md");
        tokio::fs::write(&destination, "old").await.unwrap();
        std::fs::set_permissions(&destination, std::fs::Permissions::from_mode(0o644)).unwrap();

        transfer.download("a.md", &destination).await.unwrap();
        let mode = std::fs::metadata(&destination).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[tokio::test]
    async fn test_download_without_domain_issues_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;
        let (transfer, store) = transfer(MockStore::default().with_bucket("notes"));
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a.md");

        let err = transfer.download("a.md", &destination).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::DomainNotFound(bucket) if bucket == "notes"));
        assert_eq!(store.domain_queries(), 1);
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_download_network_failure() {
        // Nothing listens on port 1.
        let (transfer, _) = transfer(MockStore::default().with_domains(["http://127.0.0.1:1"]));
        let dir = tempfile::tempdir().unwrap();
        let err = transfer.download("a.md", &dir.path().join("a.md")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network(_)));
        assert!(err.is_retryable());
    }
}
