//! The request loop between the editor and the sync core.

use crate::error::{ErrorKind, Result};
use crate::events::{SyncEvent, SyncRequest};
use crate::locks::KeyLocks;
use crate::policy::Reconciler;
use crate::transfer::Transfer;
use cloudmd_config::{Credentials, Provider, Settings};
use cloudmd_registry::Registry;
use cloudmd_storage::StoreHandle;
use cloudmd_storage::backend::{QiniuStore, ReadOnlyStore};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Where settings come from. Consulted once per request.
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> cloudmd_config::error::Result<Settings>;
}

/// Settings read from a file (or the default location) on every request.
#[derive(Debug, Clone, Default)]
pub struct FileSettings {
    path: Option<PathBuf>,
}
impl FileSettings {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}
impl SettingsSource for FileSettings {
    fn load(&self) -> cloudmd_config::error::Result<Settings> {
        Settings::load(self.path.as_deref())
    }
}

/// Fixed settings.
impl SettingsSource for Settings {
    fn load(&self) -> cloudmd_config::error::Result<Settings> {
        Ok(self.clone())
    }
}

/// Builds the object store for a set of settings.
pub trait Connector: Send + Sync {
    fn connect(&self, settings: &Settings, credentials: &Credentials) -> Result<StoreHandle>;
}

/// Connects to the provider named in the settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderConnector;
impl Connector for ProviderConnector {
    fn connect(&self, settings: &Settings, credentials: &Credentials) -> Result<StoreHandle> {
        match settings.provider {
            Provider::Qiniu => {
                let store = QiniuStore::new(
                    credentials.access_key.clone(),
                    credentials.secret_key.clone(),
                    credentials.bucket_name.clone(),
                )
                .or_raise(|| ErrorKind::Storage)?;
                Ok(Arc::new(store))
            },
            #[cfg(feature = "s3")]
            Provider::S3 => Ok(Arc::new(cloudmd_storage::backend::S3Store::new(
                credentials.bucket_name.clone(),
                settings.region.clone().unwrap_or_else(|| "us-east-1".to_string()),
                settings.endpoint.clone(),
                settings.public_domain.clone(),
                credentials.access_key.clone(),
                credentials.secret_key.clone(),
            ))),
            #[cfg(not(feature = "s3"))]
            Provider::S3 => exn::bail!(ErrorKind::UnsupportedProvider(settings.provider.to_string())),
        }
    }
}

struct Inner {
    settings: Box<dyn SettingsSource>,
    connector: Box<dyn Connector>,
    http: reqwest::Client,
    locks: KeyLocks,
    /// The store built for the most recent settings. Its domain cache lives
    /// exactly as long as the settings it was built from stay the same.
    store: Mutex<Option<(Settings, StoreHandle)>>,
}

/// Serves [`SyncRequest`]s, answering with [`SyncEvent`]s.
///
/// Every request runs as its own task, so a slow bulk upload doesn't hold
/// up a download. Requests for the same remote key still run one at a time.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<Inner>,
}
impl SyncService {
    pub fn new(settings: impl SettingsSource + 'static, connector: impl Connector + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: Box::new(settings),
                connector: Box::new(connector),
                http: reqwest::Client::new(),
                locks: KeyLocks::new(),
                store: Mutex::new(None),
            }),
        }
    }

    /// Handle requests until the request channel closes, then wait for the
    /// ones still in flight.
    pub async fn run(self, mut requests: mpsc::Receiver<SyncRequest>, events: mpsc::Sender<SyncEvent>) {
        let mut tasks = JoinSet::new();
        while let Some(request) = requests.recv().await {
            let service = self.clone();
            let events = events.clone();
            tasks.spawn(async move { service.handle(request, &events).await });
            while tasks.try_join_next().is_some() {}
        }
        while tasks.join_next().await.is_some() {}
        tracing::debug!("Request channel closed, sync service stopped");
    }

    /// Handle one request to completion, sending every resulting event.
    pub async fn handle(&self, request: SyncRequest, events: &mpsc::Sender<SyncEvent>) {
        tracing::debug!(?request, "Handling sync request");
        match request {
            SyncRequest::UploadFile { key, path } => {
                emit(events, self.upload_file(&key, &path).await).await;
            },
            SyncRequest::DownloadFile { key, path, id } => {
                emit(events, self.download_file(&key, &path, id).await).await;
            },
            SyncRequest::UploadAll => {
                send(events, SyncEvent::LoadingStatus { loading: true }).await;
                emit(events, self.upload_all().await).await;
                send(events, SyncEvent::LoadingStatus { loading: false }).await;
            },
            SyncRequest::ConfigSaved => {
                let enabled = match self.inner.settings.load() {
                    Ok(settings) => settings.is_sync_enabled(),
                    Err(e) => {
                        tracing::warn!(error = ?e, "Could not load settings");
                        false
                    },
                };
                send(events, SyncEvent::SyncAvailability { enabled }).await;
            },
        }
    }

    async fn upload_file(&self, key: &str, path: &Path) -> Result<SyncEvent> {
        self.reconciler()?.upload(key, path).await?;
        Ok(SyncEvent::ActiveFileUploaded)
    }

    async fn download_file(&self, key: &str, path: &Path, id: String) -> Result<SyncEvent> {
        let reconciler = self.reconciler()?;
        let registry = self.registry().await?;
        let status = reconciler.download(&registry, key, path, &id).await?;
        Ok(SyncEvent::FileDownloaded { status, id })
    }

    async fn upload_all(&self) -> Result<SyncEvent> {
        let reconciler = self.reconciler()?;
        let registry = self.registry().await?;
        let count = reconciler.upload_all(&registry).await?;
        Ok(SyncEvent::FilesUploaded { count })
    }

    fn settings(&self) -> Result<Settings> {
        self.inner.settings.load().or_raise(|| ErrorKind::Config)
    }

    /// Store for the current settings, reusing the previous one unless the
    /// settings changed.
    fn store(&self, settings: Settings) -> Result<StoreHandle> {
        let credentials = settings.credentials().or_raise(|| ErrorKind::Config)?;
        let mut cached = self.inner.store.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((previous, store)) = cached.as_ref()
            && *previous == settings
        {
            return Ok(store.clone());
        }
        let mut store = self.inner.connector.connect(&settings, &credentials)?;
        if settings.read_only {
            store = Arc::new(ReadOnlyStore::new(store));
        }
        tracing::info!(
            store = store.name(),
            bucket = store.bucket(),
            read_only = settings.read_only,
            "Connected to object store"
        );
        *cached = Some((settings, store.clone()));
        Ok(store)
    }

    fn reconciler(&self) -> Result<Reconciler> {
        let store = self.store(self.settings()?)?;
        Ok(Reconciler::new(Transfer::new(store, self.inner.http.clone()), self.inner.locks.clone()))
    }

    /// The registry as currently saved by the editor.
    async fn registry(&self) -> Result<Registry> {
        let path = self.settings()?.registry_path().or_raise(|| ErrorKind::Config)?;
        Registry::load(path).await.or_raise(|| ErrorKind::Registry)
    }
}

async fn emit(events: &mpsc::Sender<SyncEvent>, outcome: Result<SyncEvent>) {
    let event = match outcome {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = ?e, "Sync request failed");
            SyncEvent::SyncFailed { message: e.to_string() }
        },
    };
    send(events, event).await;
}

async fn send(events: &mpsc::Sender<SyncEvent>, event: SyncEvent) {
    if events.send(event).await.is_err() {
        tracing::debug!("Event receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DownloadStatus;
    use cloudmd_registry::FileRecord;
    use cloudmd_storage::ObjectStore;
    use cloudmd_storage::backend::MockStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Hands out the same mock store, counting connections.
    #[derive(Clone)]
    struct MockConnector {
        store: Arc<MockStore>,
        connects: Arc<AtomicUsize>,
    }
    impl Connector for MockConnector {
        fn connect(&self, _settings: &Settings, _credentials: &Credentials) -> Result<StoreHandle> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.store.clone())
        }
    }

    /// Settings that can be edited between requests.
    #[derive(Clone, Default)]
    struct SharedSettings(Arc<Mutex<Settings>>);
    impl SettingsSource for SharedSettings {
        fn load(&self) -> cloudmd_config::error::Result<Settings> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    struct Fixture {
        service: SyncService,
        settings: SharedSettings,
        store: Arc<MockStore>,
        connects: Arc<AtomicUsize>,
        dir: tempfile::TempDir,
    }
    impl Fixture {
        fn new(store: MockStore) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let settings = SharedSettings::default();
            *settings.0.lock().unwrap() = Settings {
                access_key: Some("ak".into()),
                secret_key: Some("sk".into()),
                bucket_name: Some("notes".into()),
                registry_path: Some(dir.path().join("Files Data.json")),
                ..Default::default()
            };
            let store = Arc::new(store);
            let connects = Arc::new(AtomicUsize::new(0));
            let connector = MockConnector { store: store.clone(), connects: connects.clone() };
            Self { service: SyncService::new(settings.clone(), connector), settings, store, connects, dir }
        }

        async fn handle(&self, request: SyncRequest) -> Vec<SyncEvent> {
            let (tx, mut rx) = mpsc::channel(16);
            self.service.handle(request, &tx).await;
            drop(tx);
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        }

        async fn save_registry(&self, records: impl IntoIterator<Item = FileRecord>) {
            let mut registry = Registry::new(self.dir.path().join("Files Data.json"));
            for record in records {
                registry.insert(record).unwrap();
            }
            registry.save().await.unwrap();
        }

        async fn note(&self, title: &str) -> FileRecord {
            let path = self.dir.path().join(format!("{title}.md"));
            tokio::fs::write(&path, format!("# {title}")).await.unwrap();
            FileRecord::new(title.to_lowercase(), title, path)
        }
    }

    #[tokio::test]
    async fn test_upload_file() {
        let fx = Fixture::new(MockStore::default());
        let note = fx.note("Groceries").await;
        let events = fx.handle(SyncRequest::UploadFile { key: note.remote_key(), path: note.path }).await;
        assert_eq!(events, [SyncEvent::ActiveFileUploaded]);
        assert_eq!(fx.store.keys().await, ["Groceries.md"]);
    }

    #[tokio::test]
    async fn test_upload_failure_is_reported() {
        let fx = Fixture::new(MockStore::default());
        fx.store.fail_key("Groceries.md", 401, "bad token").await;
        let note = fx.note("Groceries").await;
        let events = fx.handle(SyncRequest::UploadFile { key: note.remote_key(), path: note.path }).await;
        assert!(matches!(events.as_slice(), [SyncEvent::SyncFailed { .. }]));
    }

    #[tokio::test]
    async fn test_download_file_scenario() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Remote"))
            .expect(1)
            .mount(&server)
            .await;
        let fx = Fixture::new(MockStore::with_objects([("a.md", b"# Remote".to_vec())]).with_domains([server.uri()]));
        fx.store.set_put_time("a.md", 20_000_000).await;
        let path = fx.dir.path().join("a.md");
        fx.save_registry([FileRecord::new("a", "a", &path).with_updated_at(1000)]).await;

        let events = fx.handle(SyncRequest::DownloadFile { key: "a.md".into(), path: path.clone(), id: "a".into() }).await;
        assert_eq!(events, [SyncEvent::FileDownloaded { status: DownloadStatus::DownloadSuccess, id: "a".into() }]);
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "# Remote");
    }

    #[tokio::test]
    async fn test_download_missing_remote() {
        let fx = Fixture::new(MockStore::default());
        fx.store.fail_key("a.md", 612, "no such file or directory").await;
        let path = fx.dir.path().join("a.md");

        let events = fx.handle(SyncRequest::DownloadFile { key: "a.md".into(), path, id: "a".into() }).await;
        assert_eq!(events, [SyncEvent::FileDownloaded { status: DownloadStatus::NoFile, id: "a".into() }]);
        assert_eq!(fx.store.domain_queries(), 0);
    }

    #[tokio::test]
    async fn test_upload_all_is_bracketed_by_loading() {
        let fx = Fixture::new(MockStore::default());
        let records = [fx.note("One").await, fx.note("Two").await];
        fx.save_registry(records).await;

        let events = fx.handle(SyncRequest::UploadAll).await;
        assert_eq!(
            events,
            [
                SyncEvent::LoadingStatus { loading: true },
                SyncEvent::FilesUploaded { count: 2 },
                SyncEvent::LoadingStatus { loading: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_all_failure_has_no_partial_success() {
        let fx = Fixture::new(MockStore::default());
        let records = [fx.note("One").await, fx.note("Two").await];
        fx.save_registry(records).await;
        fx.store.fail_key("Two.md", 503, "unavailable").await;

        let events = fx.handle(SyncRequest::UploadAll).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], SyncEvent::LoadingStatus { loading: true });
        assert!(matches!(&events[1], SyncEvent::SyncFailed { .. }));
        assert_eq!(events[2], SyncEvent::LoadingStatus { loading: false });
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_connecting() {
        let fx = Fixture::new(MockStore::default());
        fx.settings.0.lock().unwrap().secret_key = None;
        let note = fx.note("Groceries").await;

        let events = fx.handle(SyncRequest::UploadFile { key: note.remote_key(), path: note.path }).await;
        assert!(matches!(events.as_slice(), [SyncEvent::SyncFailed { .. }]));
        assert_eq!(fx.connects.load(Ordering::SeqCst), 0);
        assert!(fx.store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_config_saved_reports_availability() {
        let fx = Fixture::new(MockStore::default());
        assert_eq!(fx.handle(SyncRequest::ConfigSaved).await, [SyncEvent::SyncAvailability { enabled: true }]);
        fx.settings.0.lock().unwrap().bucket_name = Some(" ".into());
        assert_eq!(fx.handle(SyncRequest::ConfigSaved).await, [SyncEvent::SyncAvailability { enabled: false }]);
    }

    #[tokio::test]
    async fn test_store_rebuilt_when_settings_change() {
        let fx = Fixture::new(MockStore::default());
        let note = fx.note("Groceries").await;
        let upload = || SyncRequest::UploadFile { key: note.remote_key(), path: note.path.clone() };

        fx.handle(upload()).await;
        fx.handle(upload()).await;
        assert_eq!(fx.connects.load(Ordering::SeqCst), 1);

        fx.settings.0.lock().unwrap().bucket_name = Some("other".into());
        fx.handle(upload()).await;
        assert_eq!(fx.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_only_skips_uploads() {
        let fx = Fixture::new(MockStore::default());
        fx.settings.0.lock().unwrap().read_only = true;
        let note = fx.note("Groceries").await;

        let events = fx.handle(SyncRequest::UploadFile { key: note.remote_key(), path: note.path }).await;
        assert_eq!(events, [SyncEvent::ActiveFileUploaded]);
        assert!(fx.store.keys().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_until_channel_closes() {
        let fx = Fixture::new(MockStore::default());
        let one = fx.note("One").await;
        let two = fx.note("Two").await;
        let (request_tx, request_rx) = mpsc::channel(4);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let running = tokio::spawn(fx.service.clone().run(request_rx, event_tx));

        request_tx.send(SyncRequest::UploadFile { key: one.remote_key(), path: one.path }).await.unwrap();
        request_tx.send(SyncRequest::UploadFile { key: two.remote_key(), path: two.path }).await.unwrap();
        drop(request_tx);
        running.await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }
        assert_eq!(events, [SyncEvent::ActiveFileUploaded, SyncEvent::ActiveFileUploaded]);
        assert_eq!(fx.store.keys().await, ["One.md", "Two.md"]);
        assert!(fx.store.stat("One.md").await.is_ok());
    }
}
