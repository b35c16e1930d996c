//! Directory layout and staging area management.
//!
//! Owns the four logical directories a replica uses (`data`, `wal`, `host`,
//! `backup`) and the housekeeping operations that move bytes between them:
//! temp-file/folder allocation, backup staging, and atomic restore.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::FolderError;

/// The four directories a replica owns on disk.
#[derive(Debug, Clone)]
pub struct FolderLayout {
    pub data: PathBuf,
    pub wal: PathBuf,
    pub host: PathBuf,
    pub backup: PathBuf,
}

impl FolderLayout {
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data: root.join("data"),
            wal: root.join("wal"),
            host: root.join("host"),
            backup: root.join("backup"),
        }
    }
}

/// Manages the replica's on-disk directories and serializes snapshot
/// staging via a per-directory mutex, so a restore cannot race a concurrent
/// backup-temp request.
pub struct FolderManager {
    layout: FolderLayout,
    dir_mode: u32,
    staging_lock: Arc<Mutex<()>>,
}

impl FolderManager {
    pub fn new(layout: FolderLayout, dir_mode: u32) -> Self {
        Self {
            layout,
            dir_mode,
            staging_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn layout(&self) -> &FolderLayout {
        &self.layout
    }

    /// Creates (if missing) and validates all four directories with the
    /// configured permission bits. Called once at startup; a failure here is
    /// fatal to the replica.
    pub fn ensure_all(&self) -> Result<(), FolderError> {
        for dir in [
            &self.layout.data,
            &self.layout.wal,
            &self.layout.host,
            &self.layout.backup,
        ] {
            self.ensure_dir(dir)?;
        }
        Ok(())
    }

    fn ensure_dir(&self, path: &Path) -> Result<(), FolderError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|source| FolderError::Create {
                path: path.display().to_string(),
                source,
            })?;
            set_permissions(path, self.dir_mode)?;
        }
        let meta = std::fs::metadata(path).map_err(|source| FolderError::Check {
            path: path.display().to_string(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(FolderError::Check {
                path: path.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "path exists and is not a directory",
                ),
            });
        }
        Ok(())
    }

    /// Allocates a path for a new temp file under `backup`. The caller owns
    /// cleanup.
    pub fn new_temp_file(&self, ext: &str) -> PathBuf {
        let name = format!("{}.{}", uniq_name(), ext);
        self.layout.backup.join(name)
    }

    /// Allocates a fresh, empty temp folder under `backup`.
    pub fn new_temp_folder(&self) -> Result<PathBuf, FolderError> {
        let path = self.layout.backup.join(uniq_name());
        std::fs::create_dir_all(&path).map_err(|source| FolderError::Create {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }

    /// Copies the live data directory into a fresh temp folder for staging a
    /// backup/snapshot. Serialized against concurrent restores via
    /// `staging_lock`. Cleans up partial output on error.
    pub async fn new_backup_temp(&self) -> Result<PathBuf, FolderError> {
        let _guard = self.staging_lock.lock().await;
        let dest = self.new_temp_folder()?;
        if let Err(e) = copy_dir_recursive(&self.layout.data, &dest) {
            let _ = std::fs::remove_dir_all(&dest);
            return Err(FolderError::Copy {
                from: self.layout.data.display().to_string(),
                to: dest.display().to_string(),
                source: e,
            });
        }
        debug!(dest = %dest.display(), "staged backup temp folder");
        Ok(dest)
    }

    /// Atomically replaces the live data directory with the contents of
    /// `source_dir`. The engine must already be closed by the caller. A
    /// rollback copy of the previous data directory is kept at
    /// `<backup>/rollback-<id>` until the caller calls
    /// [`FolderManager::discard_rollback`].
    pub async fn restore_backup(&self, source_dir: &Path) -> Result<PathBuf, FolderError> {
        let _guard = self.staging_lock.lock().await;
        let rollback = self.layout.backup.join(format!("rollback-{}", uniq_name()));

        if self.layout.data.exists() {
            std::fs::rename(&self.layout.data, &rollback).map_err(|source| FolderError::Copy {
                from: self.layout.data.display().to_string(),
                to: rollback.display().to_string(),
                source,
            })?;
        }

        match std::fs::rename(source_dir, &self.layout.data) {
            Ok(()) => {
                info!(
                    rollback = %rollback.display(),
                    "restored backup into live data directory"
                );
                Ok(rollback)
            }
            Err(source) => {
                // best-effort rollback: put the previous directory back.
                if rollback.exists() {
                    let _ = std::fs::rename(&rollback, &self.layout.data);
                }
                Err(FolderError::Copy {
                    from: source_dir.display().to_string(),
                    to: self.layout.data.display().to_string(),
                    source,
                })
            }
        }
    }

    /// Removes a rollback directory produced by [`FolderManager::restore_backup`]
    /// once the caller has confirmed the engine reopened successfully.
    pub fn discard_rollback(&self, rollback: &Path) -> Result<(), FolderError> {
        if rollback.exists() {
            std::fs::remove_dir_all(rollback).map_err(|source| FolderError::Delete {
                path: rollback.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Removes a temp folder/file allocated by this manager, warning (not
    /// failing) if it is already gone.
    pub fn cleanup(&self, path: &Path) {
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        if let Err(e) = result {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to clean up temp path");
            }
        }
    }
}

fn uniq_name() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", std::process::id(), n)
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<(), FolderError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|source| {
        FolderError::Create {
            path: path.display().to_string(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<(), FolderError> {
    Ok(())
}

fn copy_dir_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_all_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = FolderManager::new(FolderLayout::under(tmp.path()), 0o755);
        mgr.ensure_all().unwrap();
        assert!(mgr.layout().data.is_dir());
        assert!(mgr.layout().wal.is_dir());
        assert!(mgr.layout().host.is_dir());
        assert!(mgr.layout().backup.is_dir());
    }

    #[tokio::test]
    async fn backup_and_restore_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = FolderManager::new(FolderLayout::under(tmp.path()), 0o755);
        mgr.ensure_all().unwrap();
        std::fs::write(mgr.layout().data.join("a.txt"), b"hello").unwrap();

        let staged = mgr.new_backup_temp().await.unwrap();
        assert_eq!(std::fs::read(staged.join("a.txt")).unwrap(), b"hello");

        std::fs::write(mgr.layout().data.join("a.txt"), b"overwritten").unwrap();
        let rollback = mgr.restore_backup(&staged).await.unwrap();
        assert_eq!(std::fs::read(mgr.layout().data.join("a.txt")).unwrap(), b"hello");
        assert!(rollback.exists());
        mgr.discard_rollback(&rollback).unwrap();
        assert!(!rollback.exists());
    }
}
