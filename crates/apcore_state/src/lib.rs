//! Crash-safe persistence of [`InstallRecord`]s.
//!
//! The store is a single JSON document mapping `app_id` to [`InstallRecord`].
//! Every mutation is written to a sibling temporary file and atomically
//! renamed into place, so a process killed mid-write never leaves a torn
//! document behind: readers always see either the state before the mutation
//! or the state after it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Durable evidence that `app_id` at a given version was installed by this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    /// Identifier of the installed package.
    pub app_id: String,
    /// Version recorded at install time.
    pub version: String,
    /// Absolute path of the installer artifact that was run.
    pub installer_path: PathBuf,
    /// UTC instant the install was recorded.
    pub installed_at: DateTime<Utc>,
    /// Dependency `app_id`s this record declared as installed at install time.
    pub dependencies_installed: Vec<String>,
    /// Hex sha256 digest that was verified before running the installer.
    pub hash_verified: String,
    /// Whether an Authenticode signature check passed for this artifact.
    pub signature_verified: bool,
}

/// Errors raised while reading or writing the state document.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// The state file could not be read (other than simply not existing).
    #[error("failed to read state file {0:?}: {1}")]
    Read(PathBuf, String),

    /// The state file's contents were not valid JSON in the expected shape.
    #[error("state file {0:?} is corrupt: {1}")]
    Corrupt(PathBuf, String),

    /// The replacement document could not be serialized.
    #[error("failed to serialize state document: {0}")]
    Serialize(String),

    /// The atomic write (temp file + rename) failed.
    #[error("failed to persist state file {0:?}: {1}")]
    Write(PathBuf, String),
}

/// Key-value store from `app_id` to [`InstallRecord`], persisted as a single
/// JSON document.
///
/// A `StateStore` is single-writer within one process. Concurrent processes
/// touching the same file must serialize externally; the atomic-rename
/// discipline only guarantees that any single replacement is crash-safe, not
/// that two processes racing to write won't clobber each other's last write.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    records: BTreeMap<String, InstallRecord>,
}

impl StateStore {
    /// Opens (or lazily creates) the state file at `path`.
    ///
    /// A missing or empty file is treated as an empty store, per spec: readers
    /// must tolerate a store that has never been written to.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateStoreError> {
        let path = path.into();
        let records = match fs_err::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| StateStoreError::Corrupt(path.clone(), e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StateStoreError::Read(path.clone(), e.to_string())),
        };
        tracing::debug!(path = %path.display(), count = records.len(), "opened state store");
        Ok(Self { path, records })
    }

    /// Looks up the record for `app_id`, if installed.
    pub fn get(&self, app_id: &str) -> Option<&InstallRecord> {
        self.records.get(app_id)
    }

    /// Returns whether `app_id` has an install record.
    pub fn contains(&self, app_id: &str) -> bool {
        self.records.contains_key(app_id)
    }

    /// Returns every install record, ordered by `app_id`.
    pub fn list(&self) -> impl Iterator<Item = &InstallRecord> {
        self.records.values()
    }

    /// Upserts `record` by its `app_id` and durably persists the result.
    pub fn mark_installed(&mut self, record: InstallRecord) -> Result<(), StateStoreError> {
        self.records.insert(record.app_id.clone(), record);
        self.persist()
    }

    /// Removes the record for `app_id`, if present, and durably persists the result.
    pub fn mark_uninstalled(&mut self, app_id: &str) -> Result<(), StateStoreError> {
        self.records.remove(app_id);
        self.persist()
    }

    /// The path this store reads from and writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StateStoreError> {
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| StateStoreError::Serialize(e.to_string()))?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs_err::create_dir_all(parent)
            .map_err(|e| StateStoreError::Write(self.path.clone(), e.to_string()))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".state-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| StateStoreError::Write(self.path.clone(), e.to_string()))?;
        use std::io::Write;
        temp.write_all(json.as_bytes())
            .and_then(|()| temp.flush())
            .map_err(|e| StateStoreError::Write(self.path.clone(), e.to_string()))?;

        temp.persist(&self.path)
            .map_err(|e| StateStoreError::Write(self.path.clone(), e.to_string()))?;

        tracing::debug!(path = %self.path.display(), "persisted state store");
        Ok(())
    }
}
