//! Qiniu-compatible object store.
//!
//! Talks to three services: the resource service (`rs`) for stat and delete,
//! the upload service (`up`) for form uploads, and the API service (`api`)
//! for listing the domains bound to a bucket. Any response other than a 2xx
//! is turned into an error carrying the status code and body; status 612
//! means the object does not exist.

mod auth;

use self::auth::{Signer, encoded_entry};
use crate::error::{ErrorKind, Result};
use crate::{DomainCache, ObjectStore, PutResponse, RemoteStat, validate_key};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use std::path::Path;
use time::OffsetDateTime;
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// Upload tokens are valid for an hour; each upload mints a fresh one.
const UPLOAD_TOKEN_LIFETIME_SECS: i64 = 3600;
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Service hosts for one storage region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Resource management (stat, delete).
    pub rs: String,
    /// Form uploads.
    pub up: String,
    /// Bucket administration (domain listing).
    pub api: String,
}
impl Default for Endpoints {
    /// East China (z0), where buckets are created unless chosen otherwise.
    fn default() -> Self {
        Self {
            rs: "https://rs.qiniu.com".to_string(),
            up: "https://up.qiniup.com".to_string(),
            api: "https://api.qiniu.com".to_string(),
        }
    }
}
impl Endpoints {
    /// Route every service to the same base URL (gateways, test servers).
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            rs: base.clone(),
            up: base.clone(),
            api: base,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatBody {
    #[serde(default)]
    fsize: u64,
    #[serde(default)]
    hash: String,
    mime_type: Option<String>,
    put_time: i64,
}

/// Qiniu-compatible object store.
///
/// # Examples
///
/// ```no_run
/// use cloudmd_storage::{ObjectStore, backend::QiniuStore};
///
/// # async fn example() -> cloudmd_storage::error::Result<()> {
/// let store = QiniuStore::new("access-key", "secret-key", "notes")?;
/// let stat = store.stat("Shopping list.md").await?;
/// println!("last written at {}ms", stat.updated_at_millis());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct QiniuStore {
    signer: Signer,
    bucket: String,
    endpoints: Endpoints,
    http: Client,
    domain: DomainCache,
}
impl QiniuStore {
    /// Create a store for `bucket` in the default region.
    ///
    /// No request is made; invalid credentials only surface as a
    /// [`Remote`](ErrorKind::Remote) error (usually status 401) on first use.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>, bucket: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("cloudmd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ErrorKind::Network(e.to_string()))?;
        Ok(Self {
            signer: Signer::new(access_key, secret_key),
            bucket: bucket.into(),
            endpoints: Endpoints::default(),
            http,
            domain: DomainCache::default(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Send a signed management request. `path_and_query` must start with `/`.
    async fn management(&self, method: Method, host: &str, path_and_query: &str) -> Result<Response> {
        let token = self.signer.management_token(path_and_query, None);
        self.http
            .request(method, format!("{host}{path_and_query}"))
            .header(AUTHORIZATION, format!("QBox {token}"))
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| ErrorKind::Network(e.to_string()).into())
    }

    /// Pass successful responses through, turn everything else into an error.
    async fn check(key: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        exn::bail!(ErrorKind::from_status(key, status.as_u16(), body))
    }
}

#[async_trait]
impl ObjectStore for QiniuStore {
    fn name(&self) -> &str {
        "qiniu"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn domain_cache(&self) -> &DomainCache {
        &self.domain
    }

    #[instrument(skip(self), fields(bucket = %self.bucket, path = %local_path.display()))]
    async fn upload(&self, key: &str, local_path: &Path) -> Result<PutResponse> {
        let key = validate_key(key)?;
        let deadline = OffsetDateTime::now_utc().unix_timestamp() + UPLOAD_TOKEN_LIFETIME_SECS;
        let token = self.signer.upload_token(&self.bucket, &key, deadline)?;

        let file = tokio::fs::File::open(local_path).await.map_err(ErrorKind::Io)?;
        let length = file.metadata().await.map_err(ErrorKind::Io)?.len();
        let file_name = local_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| key.clone());
        let part = Part::stream_with_length(reqwest::Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| ErrorKind::BackendError(e.to_string()))?;
        let form = Form::new().text("token", token).text("key", key.clone()).part("file", part);

        let response = self
            .http
            .post(format!("{}/", self.endpoints.up))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ErrorKind::Network(e.to_string()))?;
        let response = Self::check(&key, response).await?;
        let body: PutResponse =
            response.json().await.or_raise(|| ErrorKind::InvalidResponse("upload response".to_string()))?;
        tracing::info!(key = %body.key, hash = %body.hash, bytes = length, "Uploaded object");
        Ok(body)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<()> {
        let key = validate_key(key)?;
        let path = format!("/delete/{}", encoded_entry(&self.bucket, &key));
        let response = self.management(Method::POST, &self.endpoints.rs, &path).await?;
        Self::check(&key, response).await?;
        tracing::info!(%key, "Deleted object");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn stat(&self, key: &str) -> Result<RemoteStat> {
        let key = validate_key(key)?;
        let path = format!("/stat/{}", encoded_entry(&self.bucket, &key));
        let response = self.management(Method::GET, &self.endpoints.rs, &path).await?;
        let response = Self::check(&key, response).await?;
        let body: StatBody =
            response.json().await.or_raise(|| ErrorKind::InvalidResponse("stat response".to_string()))?;
        Ok(RemoteStat {
            key,
            put_time: body.put_time,
            size: body.fsize,
            hash: body.hash,
            mime_type: body.mime_type,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn bucket_domains(&self) -> Result<Vec<String>> {
        let path = format!("/v6/domain/list?tbl={}", urlencoding::encode(&self.bucket));
        let response = self.management(Method::POST, &self.endpoints.api, &path).await?;
        let response = Self::check(&self.bucket, response).await?;
        let body: serde_json::Value =
            response.json().await.or_raise(|| ErrorKind::InvalidResponse("domain list response".to_string()))?;
        // Anything other than an array of strings means "no domains".
        let domains = match body {
            serde_json::Value::Array(items) => {
                items.into_iter().filter_map(|item| item.as_str().map(str::to_string)).collect()
            },
            _ => Vec::new(),
        };
        Ok(domains)
    }
}
