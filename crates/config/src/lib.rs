//! Sync settings.
//!
//! Settings are layered with [`figment`]: built-in defaults, then the JSON
//! settings file the editor's settings window writes, then `CLOUDMD_*`
//! environment variables. They are cheap to load and are re-read for every
//! sync request, so edits made in the settings window apply immediately.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::OptionExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// File name of the settings store inside the configuration directory.
pub const SETTINGS_FILE: &str = "Settings.json";
/// File name of the local metadata registry inside the configuration directory.
pub const REGISTRY_FILE: &str = "Files Data.json";
/// Prefix of environment variables overriding file settings.
pub const ENV_PREFIX: &str = "CLOUDMD_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    #[display("qiniu")]
    Qiniu,
    #[display("s3")]
    S3,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    pub provider: Provider,
    /// Region of an S3-compatible provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Endpoint URL of an S3-compatible provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Domain serving the bucket publicly, for providers without a domain
    /// listing API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_domain: Option<String>,
    /// Skip (and log) every remote write.
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<PathBuf>,
}

/// The three values required before any remote operation can run.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub bucket_name: String,
}
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "cloudmd")
}

/// Default location of the settings file.
pub fn default_settings_path() -> Result<PathBuf> {
    let dirs = project_dirs().ok_or_raise(|| ErrorKind::NoConfigDirectory)?;
    Ok(dirs.config_dir().join(SETTINGS_FILE))
}

/// `CLOUDMD_ACCESS_KEY` becomes `accessKey`, matching the file's keys.
fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        match ch {
            '_' => upper = true,
            ch if upper => {
                out.push(ch.to_ascii_uppercase());
                upper = false;
            },
            ch => out.push(ch.to_ascii_lowercase()),
        }
    }
    out
}

impl Settings {
    /// Layered settings sources, lowest priority first. A missing settings
    /// file contributes nothing.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            // Keys must stay cased: lowercasing after the mapping would turn
            // `accessKey` into `accesskey`.
            .merge(Env::prefixed(ENV_PREFIX).lowercase(false).map(|key| camel_case(key.as_str()).into()))
    }

    /// Load settings from `path`, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_settings_path()?,
        };
        tracing::debug!(path = %path.display(), "Loading settings");
        Ok(Self::figment(&path).extract().map_err(|e| ErrorKind::Invalid(e.to_string()))?)
    }

    /// The credentials, provided none of them is missing or blank.
    pub fn credentials(&self) -> Result<Credentials> {
        fn required(value: &Option<String>, field: &'static str) -> Result<String> {
            match value.as_deref().map(str::trim) {
                Some(value) if !value.is_empty() => Ok(value.to_string()),
                _ => exn::bail!(ErrorKind::MissingCredential(field)),
            }
        }
        Ok(Credentials {
            access_key: required(&self.access_key, "accessKey")?,
            secret_key: required(&self.secret_key, "secretKey")?,
            bucket_name: required(&self.bucket_name, "bucketName")?,
        })
    }

    /// Whether sync affordances should be enabled.
    pub fn is_sync_enabled(&self) -> bool {
        self.credentials().is_ok()
    }

    /// Location of the local metadata registry: the configured override, or
    /// the default file next to the settings.
    pub fn registry_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.registry_path {
            return Ok(path.clone());
        }
        let dirs = project_dirs().ok_or_raise(|| ErrorKind::NoConfigDirectory)?;
        Ok(dirs.config_dir().join(REGISTRY_FILE))
    }
}
