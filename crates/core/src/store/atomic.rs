//! Durable whole-file replacement

use std::fs::{self, File};
use std::path::Path;

use tempfile::NamedTempFile;

use super::{StoreError, StoreResult};

/// Replace `target` with the bytes produced by `write`.
///
/// The content goes to a temporary file in the target's directory, which is
/// fsynced and then renamed over the target; the directory is fsynced after
/// the rename. If `write` fails the target is left untouched and the
/// temporary file is removed.
pub(crate) fn write_atomic<F>(target: &Path, write: F) -> StoreResult<()>
where
    F: FnOnce(&mut File) -> StoreResult<()>,
{
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| StoreError::io(parent, e))?;
    write(tmp.as_file_mut())?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(target)
        .map_err(|e| StoreError::io(target, e.error))?;

    sync_dir(parent)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> StoreResult<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| StoreError::io(dir, e))
}

// Directories cannot be opened for syncing on other platforms
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> StoreResult<()> {
    Ok(())
}
