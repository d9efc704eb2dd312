// src/backup.rs

//! Per-file backup copies: create, restore, rotate, remove (spec-4.4).
//!
//! Grounded on the backup-before-overwrite step in the teacher's
//! `Transaction::backup_files` (copy original aside before staging new
//! content lands), generalized here into a standalone collaborator that
//! doesn't require an enclosing transaction.

use crate::error::{Error, Result};
use crate::fs_ops::Filesystem;
use crate::options::BackupPolicy;
use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct BackupStore;

impl BackupStore {
    /// Copy `source`'s current contents aside, returning the backup path.
    /// Filename encodes a timestamp and operation id to guarantee
    /// uniqueness: `"{base}.backup-{timestamp}-{opId}{ext}"`.
    pub fn create(
        source: &Path,
        policy: &BackupPolicy,
        operation_id: Uuid,
        fs: &dyn Filesystem,
    ) -> Result<PathBuf> {
        let dir = policy
            .directory
            .clone()
            .or_else(|| source.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("backup");
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let timestamp = Utc::now().format("%Y%m%d%H%M%S%.f");
        let backup_name = format!("{stem}.backup-{timestamp}-{operation_id}{ext}");
        let backup_path = dir.join(backup_name);

        fs.mkdir_all(&dir).map_err(Error::Io)?;
        fs.copy(source, &backup_path).map_err(|source_err| Error::WriteFailed {
            path: backup_path.clone(),
            source: source_err,
        })?;

        Ok(backup_path)
    }

    /// Restore a backup over `target`, overwriting whatever is there.
    pub fn restore(backup_path: &Path, target: &Path, fs: &dyn Filesystem) -> Result<()> {
        fs.copy(backup_path, target).map_err(|source| Error::RollbackFailed {
            reason: format!(
                "failed to restore {} from {}: {}",
                target.display(),
                backup_path.display(),
                source
            ),
        })?;
        Ok(())
    }

    /// Delete a backup. Non-fatal by contract: callers on the success path
    /// log and ignore failures here rather than fail the parent write.
    pub fn remove(backup_path: &Path, fs: &dyn Filesystem) -> Result<()> {
        if fs.exists(backup_path) {
            fs.unlink(backup_path).map_err(|source| Error::CleanupFailed {
                path: backup_path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Keep at most `max_kept` backups for `base_name` in `directory`,
    /// sorted by mtime descending, unlinking the rest. Rotation failure is
    /// non-fatal and must never fail the parent write (spec-4.4).
    pub fn rotate(directory: &Path, base_name: &str, ext: &str, max_kept: usize, fs: &dyn Filesystem) {
        if max_kept == 0 {
            return;
        }

        let prefix = format!("{base_name}.backup-");
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let mut candidates: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(ext) {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if let Ok(mtime) = meta.modified() {
                    candidates.push((path, mtime));
                }
            }
        }

        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        for (path, _) in candidates.into_iter().skip(max_kept) {
            if let Err(e) = fs.unlink(&path) {
                tracing::debug!(path = %path.display(), error = %e, "backup rotation failed to remove entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::InMemoryFilesystem;

    #[test]
    fn create_then_restore_roundtrip() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/t/a.txt"), b"original").unwrap();

        let policy = BackupPolicy::default();
        let backup = BackupStore::create(Path::new("/t/a.txt"), &policy, Uuid::new_v4(), &fs).unwrap();

        fs.write(Path::new("/t/a.txt"), b"overwritten").unwrap();
        BackupStore::restore(&backup, Path::new("/t/a.txt"), &fs).unwrap();

        assert_eq!(fs.read(Path::new("/t/a.txt")).unwrap(), b"original");
    }

    #[test]
    fn remove_of_missing_backup_is_ok() {
        let fs = InMemoryFilesystem::new();
        assert!(BackupStore::remove(Path::new("/nope.backup"), &fs).is_ok());
    }
}
