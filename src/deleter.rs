// src/deleter.rs

//! `delete` pipeline: backup -> unlink, the mirror image of
//! [`crate::creator::Creator::create`]'s backup-then-rename. The
//! compensating action for a completed delete is the same `RestoreCopy`
//! the overwrite path uses (spec-4.5's `file_delete` row), so a delete is
//! only reversible for as long as its backup survives.

use crate::backup::BackupStore;
use crate::error::{Error, Result};
use crate::fs_ops::Filesystem;
use crate::metrics::{EngineMetrics, OperationKind};
use crate::options::OperationOptions;
use crate::result::OperationResult;
use crate::rollback::{rollback_steps, CompensatingAction, RollbackStep, StepKind};
use chrono::Utc;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

pub struct Deleter<'a> {
    pub fs: &'a dyn Filesystem,
    pub metrics: &'a EngineMetrics,
}

impl<'a> Deleter<'a> {
    pub fn new(fs: &'a dyn Filesystem, metrics: &'a EngineMetrics) -> Self {
        Self { fs, metrics }
    }

    pub fn delete(&self, path: &Path, options: &OperationOptions) -> OperationResult {
        let started = Instant::now();
        let result = self.try_delete(path, options);
        let duration = started.elapsed();

        match result {
            Ok((bytes, backup_path)) => {
                self.metrics.record_success(OperationKind::Delete, duration, bytes);
                let mut result = OperationResult::success(OperationKind::Delete, path.to_path_buf(), bytes);
                result.duration = duration;
                result.metadata.backup_created = backup_path.is_some();
                result.metadata.backup_path = backup_path;
                result
            }
            Err(e) => {
                self.metrics.record_failure(OperationKind::Delete, duration, e.code());
                let mut result = OperationResult::failure(OperationKind::Delete, path.to_path_buf(), e);
                result.duration = duration;
                result
            }
        }
    }

    fn try_delete(&self, path: &Path, options: &OperationOptions) -> Result<(u64, Option<std::path::PathBuf>)> {
        if !self.fs.exists(path) {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        let size = self.fs.stat(path).map(|s| s.size).unwrap_or(0);

        let mut steps: Vec<RollbackStep> = Vec::new();
        let backup_path = if options.backup_policy.create {
            let backup = BackupStore::create(path, &options.backup_policy, Uuid::new_v4(), self.fs)?;
            steps.push(RollbackStep {
                step_number: steps.len(),
                description: format!("backup {} to {}", path.display(), backup.display()),
                kind: StepKind::Backup,
                affected_path: path.to_path_buf(),
                timestamp: Utc::now(),
                success: true,
                compensating_action: CompensatingAction::RestoreCopy {
                    backup: backup.clone(),
                    target: path.to_path_buf(),
                },
            });
            Some(backup)
        } else {
            None
        };

        let outcome = self.fs.unlink(path).map_err(|source| Error::CleanupFailed {
            path: path.to_path_buf(),
            source,
        });

        match outcome {
            Ok(()) => {
                if let Some(ref backup) = backup_path {
                    let _ = BackupStore::remove(backup, self.fs);
                }
                Ok((size, backup_path))
            }
            Err(e) => {
                let failed_steps = rollback_steps(&steps, self.fs);
                if failed_steps > 0 {
                    tracing::warn!(
                        path = %path.display(),
                        failed_steps,
                        "rollback completed with failures after delete error"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::InMemoryFilesystem;

    #[test]
    fn delete_removes_existing_file() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/t/a.txt"), b"hello").unwrap();
        let metrics = EngineMetrics::new();
        let deleter = Deleter::new(&fs, &metrics);

        let result = deleter.delete(Path::new("/t/a.txt"), &OperationOptions::default());

        assert!(result.success);
        assert_eq!(result.bytes_processed, 5);
        assert!(!fs.exists(Path::new("/t/a.txt")));
    }

    #[test]
    fn delete_of_missing_target_fails() {
        let fs = InMemoryFilesystem::new();
        let metrics = EngineMetrics::new();
        let deleter = Deleter::new(&fs, &metrics);

        let result = deleter.delete(Path::new("/t/missing.txt"), &OperationOptions::default());

        assert!(!result.success);
        assert_eq!(result.error.unwrap().code(), crate::error::ErrorCode::FileNotFound);
    }

    #[test]
    fn delete_with_backup_policy_removes_backup_on_success() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/t/a.txt"), b"hello").unwrap();
        let metrics = EngineMetrics::new();
        let deleter = Deleter::new(&fs, &metrics);

        let options = OperationOptions::default().with_backup(true);
        let result = deleter.delete(Path::new("/t/a.txt"), &options);

        assert!(result.success);
        assert!(!fs.exists(Path::new("/t/a.txt")));
        assert!(result.metadata.backup_path.is_none() || !fs.exists(result.metadata.backup_path.as_ref().unwrap()));
    }
}
