use crate::error::{EngineError, EngineResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Folders with an execute or undo currently running in this process
fn active_folders() -> &'static Mutex<HashSet<PathBuf>> {
    static ACTIVE: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

fn lock_active() -> MutexGuard<'static, HashSet<PathBuf>> {
    // A panic while holding the lock leaves the set itself consistent
    active_folders()
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// RAII marker that one operation owns a folder until it is dropped.
#[derive(Debug)]
pub struct FolderGuard {
    folder: PathBuf,
}

impl FolderGuard {
    /// Claim `folder`, failing fast if another operation already holds it
    pub fn acquire(folder: &Path) -> EngineResult<Self> {
        let mut active = lock_active();
        if !active.insert(folder.to_path_buf()) {
            tracing::warn!("Rejected concurrent operation on {}", folder.display());
            return Err(EngineError::OperationInProgress(folder.to_path_buf()));
        }

        tracing::debug!("Acquired folder guard for {}", folder.display());
        Ok(Self {
            folder: folder.to_path_buf(),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

impl Drop for FolderGuard {
    fn drop(&mut self) {
        lock_active().remove(&self.folder);
        tracing::debug!("Released folder guard for {}", self.folder.display());
    }
}

/// Returns true when an operation currently holds `folder`
pub fn is_busy(folder: &Path) -> bool {
    lock_active().contains(folder)
}
