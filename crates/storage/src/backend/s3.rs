//! S3-compatible object store.
//!
//! This module provides an object store implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), MinIO, and
//! others.
//!
//! S3 has no notion of a bucket "domain" list, so the public domain is taken
//! from configuration, falling back to the path-style bucket URL on the
//! configured endpoint.

use crate::error::{ErrorKind, Result};
use crate::{DomainCache, ObjectStore, PutResponse, RemoteStat, validate_key};
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
};
use std::path::Path;
use tracing::instrument;

/// S3-compatible object store.
///
/// # Examples
///
/// ```no_run
/// use cloudmd_storage::backend::S3Store;
///
/// let store = S3Store::new(
///     "notes",
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com"),
///     None::<String>,
///     "access_key_id",
///     "secret_access_key",
/// );
/// ```
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    public_domain: Option<String>,
    domain: std::sync::Arc<DomainCache>,
}

impl S3Store {
    /// Create a new S3 object store.
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `public_domain` - Domain serving the bucket publicly (CDN, custom domain)
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub fn new(
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        public_domain: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let region = region.into();
        let endpoint = endpoint.map(Into::into);
        let credentials = Credentials::new(key_id, key_secret, None, None, "cloudmd-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.clone()))
            // A failed request is a failed sync; the user retries by hand.
            .retry_config(RetryConfig::disabled())
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = &endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self {
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
            region,
            endpoint,
            public_domain: public_domain.map(Into::into),
            domain: Default::default(),
        }
    }

    fn map_error<E>(key: &str, err: SdkError<E, HttpResponse>) -> ErrorKind
    where
        E: std::error::Error + 'static,
    {
        match err.raw_response().map(|response| response.status().as_u16()) {
            Some(404) => ErrorKind::NotFound(key.to_string()),
            Some(status) => ErrorKind::Remote { status, body: DisplayErrorContext(&err).to_string() },
            None => ErrorKind::Network(DisplayErrorContext(&err).to_string()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        "s3"
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
        let body = ByteStream::from_path(local_path).await.map_err(|e| ErrorKind::Io(std::io::Error::other(e)))?;
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::map_error(&key, e))?;
        let hash = output.e_tag().unwrap_or_default().trim_matches('"').to_string();
        tracing::info!(%key, %hash, "Uploaded object");
        Ok(PutResponse { key, hash })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<()> {
        let key = validate_key(key)?;
        // S3 deletes are idempotent; stat first so a missing key is reported
        // the same way every other store reports it.
        self.stat(&key).await?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| Self::map_error(&key, e))?;
        tracing::info!(%key, "Deleted object");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn stat(&self, key: &str) -> Result<RemoteStat> {
        let key = validate_key(key)?;
        let output = match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) if matches!(err.as_service_error(), Some(HeadObjectError::NotFound(_))) => {
                exn::bail!(ErrorKind::NotFound(key));
            },
            Err(err) => exn::bail!(Self::map_error(&key, err)),
        };
        let Some(modified) = output.last_modified() else {
            exn::bail!(ErrorKind::InvalidResponse("missing Last-Modified".to_string()));
        };
        // Nanoseconds down to the store's 100-ns ticks.
        let put_time = i64::try_from(modified.as_nanos() / 100)
            .map_err(|_| ErrorKind::InvalidResponse("Last-Modified out of range".to_string()))?;
        Ok(RemoteStat {
            size: output.content_length().and_then(|len| u64::try_from(len).ok()).unwrap_or_default(),
            hash: output.e_tag().unwrap_or_default().trim_matches('"').to_string(),
            mime_type: output.content_type().map(str::to_string),
            ..RemoteStat::new(key, put_time)
        })
    }

    async fn bucket_domains(&self) -> Result<Vec<String>> {
        if let Some(domain) = &self.public_domain {
            return Ok(vec![domain.clone()]);
        }
        Ok(vec![match &self.endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://s3.{}.amazonaws.com/{}", self.region, self.bucket),
        }])
    }
}
