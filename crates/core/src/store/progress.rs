//! Progress checkpoint
//!
//! The checkpoint records the highest global unit index whose artifact has
//! been written. It is read once when a run starts and rewritten after every
//! completed unit.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::atomic::write_atomic;
use super::{StoreError, StoreResult};

/// Default checkpoint file name inside the staging directory
pub const PROGRESS_FILE_NAME: &str = "progress.json";

/// Persisted progress of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Highest global unit index known to be complete
    #[serde(alias = "last_completed_week")]
    pub last_completed_index: usize,
    /// Fingerprint of the planned years and routes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_fingerprint: Option<String>,
    /// When the checkpoint was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressState {
    pub fn new(last_completed_index: usize) -> Self {
        Self {
            last_completed_index,
            plan_fingerprint: None,
            updated_at: Some(Utc::now()),
        }
    }

    /// Attach the plan fingerprint
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.plan_fingerprint = Some(fingerprint.into());
        self
    }

    /// Whether the unit with this global index is already complete
    pub fn covers(&self, global_index: usize) -> bool {
        global_index <= self.last_completed_index
    }
}

/// File-backed checkpoint store
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store using the default file name inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(PROGRESS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint; `None` when no unit has completed yet
    pub fn load(&self) -> StoreResult<Option<ProgressState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let state = serde_json::from_str(&json).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(state))
    }

    /// Replace the checkpoint atomically and durably
    pub fn save(&self, state: &ProgressState) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(state).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        write_atomic(&self.path, |file| {
            file.write_all(&json)
                .map_err(|e| StoreError::io(&self.path, e))
        })
    }

    /// Remove the checkpoint if present
    pub fn clear(&self) -> StoreResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_without_checkpoint() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::in_dir(temp.path());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::in_dir(&temp.path().join("_tmp"));

        store
            .save(&ProgressState::new(7).with_fingerprint("abc"))
            .unwrap();
        let state = store.load().unwrap().unwrap();
        assert_eq!(state.last_completed_index, 7);
        assert_eq!(state.plan_fingerprint.as_deref(), Some("abc"));
        assert!(state.covers(7));
        assert!(!state.covers(8));
    }

    #[test]
    fn test_save_overwrites_and_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::in_dir(temp.path());

        store.save(&ProgressState::new(1)).unwrap();
        store.save(&ProgressState::new(2)).unwrap();

        assert_eq!(store.load().unwrap().unwrap().last_completed_index, 2);
        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(PROGRESS_FILE_NAME)]);
    }

    #[test]
    fn test_legacy_key_is_accepted() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::in_dir(temp.path());
        fs::write(store.path(), r#"{"last_completed_week": 12}"#).unwrap();

        let state = store.load().unwrap().unwrap();
        assert_eq!(state.last_completed_index, 12);
        assert_eq!(state.plan_fingerprint, None);
    }

    #[test]
    fn test_corrupt_checkpoint_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::in_dir(temp.path());
        fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Json { .. })));
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::in_dir(temp.path());
        store.clear().unwrap();
        store.save(&ProgressState::new(3)).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
