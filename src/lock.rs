//! At most one sync or clean pass at a time.
//!
//! Two passes reading the same calendars would both see a missing copy and
//! both create it.

use anyhow::{Context, Result};
use calmirror_core::config::base_dir;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::PathBuf;

/// Holds the lock until dropped
pub struct LockGuard {
    _file: File,
}

fn lock_path() -> Result<PathBuf> {
    let dir = base_dir()?;
    fs::create_dir_all(&dir)?;
    Ok(dir.join("calmirror.lock"))
}

/// Acquire the exclusive pass lock, failing if another pass holds it
pub fn acquire_lock() -> Result<LockGuard> {
    acquire_lock_at(lock_path()?)
}

fn acquire_lock_at(path: PathBuf) -> Result<LockGuard> {
    let file = File::create(&path).context("Failed to create lock file")?;

    file.try_lock_exclusive().map_err(|_| {
        anyhow::anyhow!(
            "Another calmirror pass is already running.\n\
            If you believe this is an error, remove: {}",
            path.display()
        )
    })?;

    Ok(LockGuard { _file: file })
}
