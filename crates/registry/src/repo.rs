//! The registry document and its file on disk.

use crate::FileRecord;
use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    files: BTreeMap<String, FileRecord>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Map of note id to [`FileRecord`], backed by a JSON file shared with the
/// editor.
///
/// The registry is a snapshot: it is read whole by [`load()`](Self::load),
/// mutated in memory, and replaced whole by [`save()`](Self::save). Nothing
/// is persisted until `save()` is called.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    document: Document,
}
impl Registry {
    /// Empty registry that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), document: Document::default() }
    }

    /// Read the registry at `path`. A missing file is an empty registry.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No registry file, starting empty");
                return Ok(Self::new(path));
            },
            Err(e) => exn::bail!(ErrorKind::Io(path, e)),
        };
        let document: Document =
            serde_json::from_slice(&contents).map_err(|e| ErrorKind::InvalidData(e.to_string()))?;
        tracing::debug!(path = %path.display(), files = document.files.len(), "Loaded registry");
        Ok(Self { path, document })
    }

    /// Write the registry back, replacing the file in one step.
    pub async fn save(&self) -> Result<()> {
        let contents =
            serde_json::to_vec_pretty(&self.document).map_err(|e| ErrorKind::InvalidData(e.to_string()))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ErrorKind::Io(parent.to_path_buf(), e))?;
        }
        let temp = temporary_sibling(&self.path);
        if let Err(e) = tokio::fs::write(&temp, &contents).await {
            let _ = tokio::fs::remove_file(&temp).await;
            exn::bail!(ErrorKind::Io(temp, e));
        }
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            exn::bail!(ErrorKind::Io(self.path.clone(), e));
        }
        tracing::debug!(path = %self.path.display(), files = self.document.files.len(), "Saved registry");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.document.files.get(id)
    }

    /// Every record, ordered by id.
    pub fn files(&self) -> impl ExactSizeIterator<Item = &FileRecord> {
        self.document.files.values()
    }

    pub fn len(&self) -> usize {
        self.document.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.files.is_empty()
    }

    /// Add a new record. Fails if the id is already taken.
    pub fn insert(&mut self, record: FileRecord) -> Result<()> {
        if self.document.files.contains_key(&record.id) {
            exn::bail!(ErrorKind::Duplicate(record.id));
        }
        self.document.files.insert(record.id.clone(), record);
        Ok(())
    }

    /// Add or replace a record, returning the one it replaced.
    pub fn upsert(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.document.files.insert(record.id.clone(), record)
    }

    /// Change a note's title and local path. The remote key follows the
    /// title, so the next upload lands under the new key.
    pub fn rename(&mut self, id: &str, title: impl Into<String>, path: impl Into<PathBuf>) -> Result<&FileRecord> {
        let Some(record) = self.document.files.get_mut(id) else {
            exn::bail!(ErrorKind::NotFound(id.to_string()));
        };
        record.title = title.into();
        record.path = path.into();
        Ok(record)
    }

    /// Record a local modification at `updated_at` (epoch milliseconds).
    pub fn touch(&mut self, id: &str, updated_at: i64) -> Result<()> {
        let Some(record) = self.document.files.get_mut(id) else {
            exn::bail!(ErrorKind::NotFound(id.to_string()));
        };
        record.updated_at = Some(updated_at);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<FileRecord> {
        self.document.files.remove(id)
    }
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}
