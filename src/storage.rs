use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::style::ReaderStyle;

pub const PROGRESS_KEY: &str = "pageturn:reader-progress";
pub const PREFERENCES_KEY: &str = "pageturn:reader-preferences";

/// String-keyed durable storage holding JSON blobs.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-memory storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, String>>>,
    failing: Rc<Cell<bool>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent read and write fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if self.failing.get() {
            return Err(anyhow!("storage unavailable"));
        }
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if self.failing.get() {
            return Err(anyhow!("storage unavailable"));
        }
        self.insert_raw(key, value);
        Ok(())
    }
}

/// All keys in one pretty-printed JSON map on disk.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl FileStorage {
    /// Unreadable or corrupt files start empty and get overwritten on the
    /// next write.
    pub fn open(path: &Path) -> Self {
        let entries = Self::read_entries(path).unwrap_or_else(|e| {
            error!("Failed to load reader storage from {}: {}", path.display(), e);
            HashMap::new()
        });
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    fn read_entries(path: &Path) -> Result<HashMap<String, String>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub chapter_id: String,
    pub section_id: String,
    pub point_id: String,
    /// Page index within the chapter.
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesRecord {
    #[serde(default)]
    pub style: ReaderStyle,
    #[serde(default = "default_turn_speed")]
    pub turn_speed: f32,
    #[serde(default)]
    pub auto_voice: bool,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

fn default_turn_speed() -> f32 {
    crate::state::DEFAULT_TURN_SPEED
}

fn read_json<T: for<'de> Deserialize<'de>>(storage: &dyn Storage, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            error!("{}", crate::error::ReaderError::Persistence(format!("read {key}: {e}")));
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Discarding unreadable {key}: {e}");
            None
        }
    }
}

fn write_json<T: Serialize>(storage: &mut dyn Storage, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(anyhow::Error::from)
        .and_then(|raw| storage.set(key, &raw));
    match result {
        Ok(()) => debug!("Stored {key}"),
        Err(e) => error!("{}", crate::error::ReaderError::Persistence(format!("write {key}: {e}"))),
    }
}

pub fn load_progress(storage: &dyn Storage) -> Option<ProgressRecord> {
    read_json(storage, PROGRESS_KEY)
}

pub fn save_progress(storage: &mut dyn Storage, record: &ProgressRecord) {
    write_json(storage, PROGRESS_KEY, record);
}

pub fn load_preferences(storage: &dyn Storage) -> Option<PreferencesRecord> {
    read_json(storage, PREFERENCES_KEY)
}

pub fn save_preferences(storage: &mut dyn Storage, record: &PreferencesRecord) {
    write_json(storage, PREFERENCES_KEY, record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn progress() -> ProgressRecord {
        ProgressRecord {
            chapter_id: "c1".into(),
            section_id: "s1".into(),
            point_id: "p2".into(),
            chunk_index: 3,
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        }
    }

    #[test]
    fn test_progress_uses_camel_case_json() {
        let mut storage = MemoryStorage::new();
        save_progress(&mut storage, &progress());

        let raw = storage.raw(PROGRESS_KEY).unwrap();
        assert!(raw.contains("\"chapterId\":\"c1\""));
        assert!(raw.contains("\"chunkIndex\":3"));
        assert!(raw.contains("\"timestamp\":1700000000000"));
        assert_eq!(load_progress(&storage), Some(progress()));
    }

    #[test]
    fn test_corrupt_record_reads_as_missing() {
        let storage = MemoryStorage::new();
        storage.insert_raw(PROGRESS_KEY, "{not json");
        assert_eq!(load_progress(&storage), None);
    }

    #[test]
    fn test_failures_are_swallowed() {
        let mut storage = MemoryStorage::new();
        storage.set_failing(true);
        save_progress(&mut storage, &progress());
        assert_eq!(load_progress(&storage), None);

        storage.set_failing(false);
        assert_eq!(storage.raw(PROGRESS_KEY), None);
    }

    #[test]
    fn test_preferences_fill_missing_fields() {
        let storage = MemoryStorage::new();
        storage.insert_raw(PREFERENCES_KEY, r#"{"style":{"fontSize":30}}"#);
        let record = load_preferences(&storage).unwrap();
        assert_eq!(record.style.font_size, 30);
        assert_eq!(record.style.font_id, "alice");
        assert_eq!(record.turn_speed, 1.0);
        assert!(!record.auto_voice);
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("reader.json");

        let mut storage = FileStorage::open(&path);
        save_progress(&mut storage, &progress());

        let reopened = FileStorage::open(&path);
        assert_eq!(load_progress(&reopened), Some(progress()));
    }

    #[test]
    fn test_file_storage_recovers_from_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reader.json");
        fs::write(&path, "garbage").unwrap();

        let mut storage = FileStorage::open(&path);
        assert_eq!(storage.get(PROGRESS_KEY).unwrap(), None);
        storage.set("k", "v").unwrap();
        assert_eq!(FileStorage::open(&path).get("k").unwrap().as_deref(), Some("v"));
    }
}
