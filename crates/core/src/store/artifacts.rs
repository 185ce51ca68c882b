//! Weekly artifacts: one Parquet file per processed unit

use std::fs;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use tracing::debug;

use super::parquet_io::{read_parquet, write_parquet_atomic};
use super::{StoreError, StoreResult};

/// An artifact found on disk
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoredArtifact {
    pub year: i32,
    pub index: usize,
    pub path: PathBuf,
}

impl StoredArtifact {
    /// Recover `(year, index)` from a file name like `2024_week_3.parquet`
    pub fn from_path(path: &Path) -> StoreResult<Self> {
        let invalid = || StoreError::InvalidArtifactName(path.to_path_buf());

        let stem = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".parquet"))
            .ok_or_else(invalid)?;
        let (year, index) = stem.split_once("_week_").ok_or_else(invalid)?;

        Ok(Self {
            year: year.parse().map_err(|_| invalid())?,
            index: index.parse().map_err(|_| invalid())?,
            path: path.to_path_buf(),
        })
    }
}

/// Directory of weekly artifacts
#[derive(Debug, Clone)]
pub struct WeeklyUnitStore {
    dir: PathBuf,
}

impl WeeklyUnitStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a unit
    pub fn file_name(year: i32, index: usize) -> String {
        format!("{year}_week_{index}.parquet")
    }

    pub fn path_for(&self, year: i32, index: usize) -> PathBuf {
        self.dir.join(Self::file_name(year, index))
    }

    /// Write (or overwrite) the artifact of a unit
    pub fn write(
        &self,
        year: i32,
        index: usize,
        batch: &RecordBatch,
    ) -> StoreResult<StoredArtifact> {
        let path = self.path_for(year, index);
        write_parquet_atomic(&path, batch)?;
        debug!(path = %path.display(), rows = batch.num_rows(), "Wrote weekly artifact");
        Ok(StoredArtifact { year, index, path })
    }

    /// All artifacts in the directory, in no particular order
    pub fn list_all(&self) -> StoreResult<Vec<StoredArtifact>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let pattern = format!(
            "{}/*_week_*.parquet",
            glob::Pattern::escape(&self.dir.to_string_lossy())
        );
        let paths = glob::glob(&pattern).map_err(|e| StoreError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

        let mut artifacts = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                StoreError::io(path, e.into())
            })?;
            match StoredArtifact::from_path(&path) {
                Ok(artifact) => artifacts.push(artifact),
                Err(_) => debug!(path = %path.display(), "Ignoring unrelated file"),
            }
        }
        Ok(artifacts)
    }

    /// Read an artifact back
    pub fn read(&self, artifact: &StoredArtifact) -> StoreResult<RecordBatch> {
        read_parquet(&artifact.path)
    }

    /// Remove every artifact, leaving other files in place; returns the count
    pub fn remove_artifacts(&self) -> StoreResult<usize> {
        let artifacts = self.list_all()?;
        for artifact in &artifacts {
            fs::remove_file(&artifact.path).map_err(|e| StoreError::io(&artifact.path, e))?;
        }
        Ok(artifacts.len())
    }

    /// Remove the whole directory, checkpoint included
    pub fn remove_all(&self) -> StoreResult<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.dir, e)),
        }
    }
}
