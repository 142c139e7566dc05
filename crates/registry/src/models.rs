use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Extension appended to a note's title to form its remote key.
pub const NOTE_EXTENSION: &str = "md";

/// Local metadata of one note.
///
/// Fields the sync core doesn't use (creation time, sync flags written by
/// the editor) are carried through untouched so saving the registry never
/// loses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub title: String,
    pub path: PathBuf,
    /// Last local modification, in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl FileRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            path: path.into(),
            updated_at: None,
            is_new: None,
            extra: Map::new(),
        }
    }

    pub fn with_updated_at(mut self, updated_at: i64) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Key the note is stored under remotely.
    ///
    /// ```
    /// use cloudmd_registry::FileRecord;
    /// assert_eq!(FileRecord::new("1", "Groceries", "/notes/Groceries.md").remote_key(), "Groceries.md");
    /// ```
    pub fn remote_key(&self) -> String {
        format!("{}.{NOTE_EXTENSION}", self.title)
    }
}
