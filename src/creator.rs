// src/creator.rs

//! `create` pipeline: temp -> write -> verify -> rename -> chmod
//! (spec-4.1).

use crate::atomic::atomic_rename;
use crate::backup::BackupStore;
use crate::checksum::hash_bytes;
use crate::error::{Error, Result};
use crate::fs_ops::Filesystem;
use crate::io_util::{is_retryable, write_staged};
use crate::metrics::{EngineMetrics, OperationKind};
use crate::options::OperationOptions;
use crate::result::OperationResult;
use crate::rollback::{rollback_steps, CompensatingAction, RollbackStep, StepKind};
use crate::tempfile::TempFileTracker;
use chrono::Utc;
use std::path::Path;
use std::time::Instant;

pub struct Creator<'a> {
    pub fs: &'a dyn Filesystem,
    pub tracker: &'a TempFileTracker,
    pub metrics: &'a EngineMetrics,
}

impl<'a> Creator<'a> {
    pub fn new(fs: &'a dyn Filesystem, tracker: &'a TempFileTracker, metrics: &'a EngineMetrics) -> Self {
        Self { fs, tracker, metrics }
    }

    pub fn create(&self, path: &Path, content: &[u8], options: &OperationOptions) -> OperationResult {
        let started = Instant::now();
        let mut retry_attempts = 0u32;

        let outcome = loop {
            match self.try_create(path, content, options) {
                Ok(result) => break Ok(result),
                Err(e) if retry_attempts < options.retries && Self::is_transient(&e) => {
                    retry_attempts += 1;
                    self.metrics.record_retry();
                    std::thread::sleep(options.retry_delay);
                    continue;
                }
                Err(e) => break Err(e),
            }
        };

        let duration = started.elapsed();
        match outcome {
            Ok(mut result) => {
                result.duration = duration;
                result.metadata.retry_attempts = retry_attempts;
                self.metrics.record_success(OperationKind::Create, duration, result.bytes_processed);
                result
            }
            Err(e) => {
                self.metrics.record_failure(OperationKind::Create, duration, e.code());
                let mut result = OperationResult::failure(OperationKind::Create, path.to_path_buf(), e);
                result.duration = duration;
                result.metadata.retry_attempts = retry_attempts;
                result
            }
        }
    }

    fn is_transient(err: &Error) -> bool {
        matches!(
            err,
            Error::WriteFailed { source, .. }
                | Error::SyncFailed { source, .. }
                | Error::TempFileCreationFailed { source, .. }
                if is_retryable(source)
        )
    }

    fn try_create(&self, path: &Path, content: &[u8], options: &OperationOptions) -> Result<OperationResult> {
        if let Some(limit) = options.max_file_size {
            if content.len() as u64 > limit {
                return Err(Error::FileTooLarge {
                    size: content.len() as u64,
                    limit,
                });
            }
        }

        let target_exists = self.fs.exists(path);
        if target_exists && !options.overwrite {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }

        if options.create_parents {
            if let Some(parent) = path.parent() {
                self.fs.mkdir_all(parent).map_err(Error::Io)?;
            }
        }

        let record = self.tracker.create_temp(path, options)?;
        let mut steps: Vec<RollbackStep> = Vec::new();
        let mut backup_path = None;

        let result = (|| -> Result<(u64, bool, bool, Option<crate::checksum::Checksum>)> {
            write_staged(self.fs, &record.staging_path, content, options.buffer_size).map_err(|source| {
                Error::TempFileCreationFailed {
                    target: record.staging_path.clone(),
                    source,
                }
            })?;
            steps.push(RollbackStep {
                step_number: steps.len(),
                description: format!("write staged content to {}", record.staging_path.display()),
                kind: StepKind::Write,
                affected_path: record.staging_path.clone(),
                timestamp: Utc::now(),
                success: true,
                compensating_action: CompensatingAction::UnlinkIfExists(record.staging_path.clone()),
            });

            let (verified, checksum) = if options.verify_after_write {
                let staged = self.fs.read(&record.staging_path).map_err(Error::Io)?;
                if staged != content {
                    return Err(Error::VerificationFailed {
                        path: record.staging_path.clone(),
                        reason: "staged content does not match intended bytes".to_string(),
                    });
                }
                let checksum = hash_bytes(options.verification_algorithm, &staged);
                (true, Some(checksum))
            } else {
                (false, None)
            };

            let mut sync_used = false;
            if options.durability {
                self.fs.sync_file(&record.staging_path).map_err(|source| Error::SyncFailed {
                    path: record.staging_path.clone(),
                    source,
                })?;
                self.metrics.record_fsync();
                sync_used = true;
            }

            if options.overwrite && target_exists && options.backup_policy.create {
                let backup = BackupStore::create(path, &options.backup_policy, record.operation_id, self.fs)?;
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
                backup_path = Some(backup);
            }

            atomic_rename(self.fs, &record.staging_path, path, options.durability, self.metrics)?;
            steps.push(RollbackStep {
                step_number: steps.len(),
                description: format!("rename onto {}", path.display()),
                kind: StepKind::Rename,
                affected_path: path.to_path_buf(),
                timestamp: Utc::now(),
                success: true,
                compensating_action: if target_exists {
                    if let Some(ref backup) = backup_path {
                        CompensatingAction::RestoreCopy {
                            backup: backup.clone(),
                            target: path.to_path_buf(),
                        }
                    } else {
                        CompensatingAction::Noop
                    }
                } else {
                    CompensatingAction::UnlinkIfExists(path.to_path_buf())
                },
            });

            let mode = if options.preserve_permissions && target_exists {
                self.fs.stat(path).map(|s| s.mode).unwrap_or(options.mode)
            } else {
                options.mode
            };
            self.fs.chmod(path, mode).map_err(|source| Error::PermissionDenied {
                path: path.to_path_buf(),
                source,
            })?;
            steps.push(RollbackStep {
                step_number: steps.len(),
                description: format!("chmod {} to {:o}", path.display(), mode),
                kind: StepKind::Permissions,
                affected_path: path.to_path_buf(),
                timestamp: Utc::now(),
                success: true,
                compensating_action: CompensatingAction::Noop,
            });

            Ok((content.len() as u64, sync_used, verified, checksum))
        })();

        match result {
            Ok((bytes, sync_used, verified, checksum)) => {
                self.tracker.promote(record.operation_id);
                if let Some(ref backup) = backup_path {
                    let _ = BackupStore::remove(backup, self.fs);
                }

                let mut op_result = OperationResult::success(OperationKind::Create, path.to_path_buf(), bytes);
                op_result.stats = self.fs.stat(path).ok();
                op_result.metadata.sync_used = sync_used;
                op_result.metadata.verified = verified;
                op_result.metadata.checksum = checksum;
                op_result.metadata.backup_created = backup_path.is_some();
                op_result.metadata.backup_path = backup_path;
                Ok(op_result)
            }
            Err(e) => {
                let failed_steps = rollback_steps(&steps, self.fs);
                let _ = self.tracker.cleanup(record.operation_id, self.fs);
                if failed_steps > 0 {
                    tracing::warn!(path = %path.display(), failed_steps, "rollback completed with failures after create error");
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
    fn create_on_empty_target_succeeds() {
        let fs = InMemoryFilesystem::new();
        let tracker = TempFileTracker::new();
        let metrics = EngineMetrics::new();
        let creator = Creator::new(&fs, &tracker, &metrics);

        let result = creator.create(Path::new("/t/a.txt"), b"hello\n", &OperationOptions::default());

        assert!(result.success);
        assert_eq!(fs.read(Path::new("/t/a.txt")).unwrap(), b"hello\n");
        assert_eq!(fs.stat(Path::new("/t/a.txt")).unwrap().mode, 0o644);
        assert!(tracker.list_active().is_empty());
    }

    #[test]
    fn create_without_overwrite_on_existing_target_fails() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/t/a.txt"), b"hello\n").unwrap();
        let tracker = TempFileTracker::new();
        let metrics = EngineMetrics::new();
        let creator = Creator::new(&fs, &tracker, &metrics);

        let result = creator.create(Path::new("/t/a.txt"), b"x", &OperationOptions::default());

        assert!(!result.success);
        assert_eq!(result.error.unwrap().code(), crate::error::ErrorCode::AlreadyExists);
        assert_eq!(fs.read(Path::new("/t/a.txt")).unwrap(), b"hello\n");
    }

    #[test]
    fn max_file_size_rejected_before_staging() {
        let fs = InMemoryFilesystem::new();
        let tracker = TempFileTracker::new();
        let metrics = EngineMetrics::new();
        let creator = Creator::new(&fs, &tracker, &metrics);

        let options = OperationOptions::default().with_max_file_size(2);
        let result = creator.create(Path::new("/t/a.txt"), b"hello", &options);

        assert!(!result.success);
        assert_eq!(result.error.unwrap().code(), crate::error::ErrorCode::FileTooLarge);
        assert!(tracker.list_active().is_empty());
        assert!(!fs.exists(Path::new("/t/a.txt")));
    }

    #[test]
    fn verify_after_write_records_checksum() {
        let fs = InMemoryFilesystem::new();
        let tracker = TempFileTracker::new();
        let metrics = EngineMetrics::new();
        let creator = Creator::new(&fs, &tracker, &metrics);

        let options = OperationOptions::default().with_verification(crate::checksum::ChecksumAlgorithm::Sha256);
        let result = creator.create(Path::new("/t/a.txt"), b"hello\n", &options);

        assert!(result.success);
        assert!(result.metadata.verified);
        assert!(result.metadata.checksum.is_some());
    }

    #[test]
    fn overwrite_with_backup_is_removed_on_success() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/t/a.txt"), b"old").unwrap();
        let tracker = TempFileTracker::new();
        let metrics = EngineMetrics::new();
        let creator = Creator::new(&fs, &tracker, &metrics);

        let options = OperationOptions::default().with_overwrite(true).with_backup(true);
        let result = creator.create(Path::new("/t/a.txt"), b"new", &options);

        assert!(result.success);
        assert_eq!(fs.read(Path::new("/t/a.txt")).unwrap(), b"new");
        assert!(result.metadata.backup_path.is_none() || !fs.exists(result.metadata.backup_path.as_ref().unwrap()));
    }
}
