use fd_lock::RwLock;
use std::fs::File;
use std::path::{Path, PathBuf};

use super::store::StoreError;

/// Exclusive lock held by the single orchestrator of a coordination file.
/// Released when dropped.
pub struct OrchestratorLock {
    path: PathBuf,
    // the OS lock belongs to this handle and ends when it closes
    _file: RwLock<File>,
}

impl std::fmt::Debug for OrchestratorLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorLock").field("path", &self.path).finish()
    }
}

impl OrchestratorLock {
    /// Acquire singleton lock, failing if another orchestrator holds it
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut lock = RwLock::new(File::create(path)?);
        let guard = lock.try_write().map_err(|_| StoreError::LockError {
            reason: format!(
                "another orchestrator is already running ({}). Only one orchestrator can run at a time.",
                path.display()
            ),
        })?;
        // dropping the guard would unlock now; keep the lock until the file closes
        std::mem::forget(guard);

        Ok(Self {
            path: path.to_path_buf(),
            _file: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_orchestrator_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json.lock");

        let first = OrchestratorLock::acquire(&path).unwrap();
        assert!(matches!(OrchestratorLock::acquire(&path), Err(StoreError::LockError { .. })));

        drop(first);
        assert!(OrchestratorLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_lock_cycles_release_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("memory.json.lock");

        for _ in 0..64 {
            let held = OrchestratorLock::acquire(&path).unwrap();
            assert_eq!(held.path(), path);
            assert!(OrchestratorLock::acquire(&path).is_err());
            drop(held);
        }
        assert!(OrchestratorLock::acquire(&path).is_ok());
    }
}
