// src/rollback.rs

//! Rollback step journaling and compensating actions.
//!
//! Compensations are tagged variants over a closed set rather than
//! closures (spec-9 "Cycles and back references"): there is no garbage
//! collector here to keep a captured closure alive across a crash, and a
//! plain enum is trivially serializable and replayable by a pure
//! dispatcher.

use crate::error::{Error, Result};
use crate::fs_ops::Filesystem;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// The inverse of a single journaled step.
#[derive(Debug, Clone)]
pub enum CompensatingAction {
    UnlinkIfExists(PathBuf),
    RestoreCopy { backup: PathBuf, target: PathBuf },
    RestoreMode { path: PathBuf, mode: u32 },
    Rmdir(PathBuf),
    Noop,
}

/// Replay a single compensating action against a `Filesystem` capability.
pub fn apply_compensation(action: &CompensatingAction, fs: &dyn Filesystem) -> Result<()> {
    match action {
        CompensatingAction::UnlinkIfExists(path) => {
            if fs.exists(path) {
                fs.unlink(path).map_err(|source| Error::CleanupFailed {
                    path: path.clone(),
                    source,
                })?;
            }
            Ok(())
        }
        CompensatingAction::RestoreCopy { backup, target } => {
            fs.copy(backup, target).map_err(|source| Error::RollbackFailed {
                reason: format!(
                    "failed to restore {} from backup {}: {}",
                    target.display(),
                    backup.display(),
                    source
                ),
            })?;
            let _ = fs.unlink(backup);
            Ok(())
        }
        CompensatingAction::RestoreMode { path, mode } => {
            fs.chmod(path, *mode).map_err(|source| Error::RollbackFailed {
                reason: format!("failed to restore mode on {}: {}", path.display(), source),
            })
        }
        CompensatingAction::Rmdir(path) => {
            if fs.exists(path) {
                fs.rmdir(path).map_err(|source| Error::RollbackFailed {
                    reason: format!("failed to remove directory {}: {}", path.display(), source),
                })?;
            }
            Ok(())
        }
        CompensatingAction::Noop => Ok(()),
    }
}

/// A fine-grained unit within a single operation (spec-3 "Rollback step").
#[derive(Debug, Clone)]
pub struct RollbackStep {
    pub step_number: usize,
    pub description: String,
    pub kind: StepKind,
    pub affected_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub compensating_action: CompensatingAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Backup,
    Write,
    Rename,
    Delete,
    Permissions,
}

/// Execute a set of rollback steps in reverse insertion order, logging and
/// continuing past any individual compensation failure (spec-4.1: "A
/// rollback step failure is logged and the next step is attempted").
/// Returns the number of steps whose compensation failed.
pub fn rollback_steps(steps: &[RollbackStep], fs: &dyn Filesystem) -> usize {
    let mut failed = 0;
    for step in steps.iter().rev() {
        if let Err(e) = apply_compensation(&step.compensating_action, fs) {
            tracing::warn!(
                step = step.step_number,
                path = %step.affected_path.display(),
                error = %e,
                "rollback step failed; continuing with remaining steps"
            );
            failed += 1;
        }
    }
    failed
}

/// A coarser unit within a transaction (spec-3 "Rollback operation").
#[derive(Debug, Clone)]
pub struct RollbackOperation {
    pub kind: RollbackOpKind,
    pub target: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub original_permissions: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub operation_id: uuid::Uuid,
    pub operation_index: usize,
    pub steps: Vec<RollbackStep>,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOpKind {
    FileCreate,
    FileOverwrite,
    FileDelete,
    DirectoryCreate,
    PermissionChange,
}

impl RollbackOperation {
    /// Compensating action for this operation's kind, per the spec-4.5 table.
    pub fn compensate(&self, fs: &dyn Filesystem) -> Result<()> {
        match self.kind {
            RollbackOpKind::FileCreate => {
                apply_compensation(&CompensatingAction::UnlinkIfExists(self.target.clone()), fs)
            }
            RollbackOpKind::FileOverwrite | RollbackOpKind::FileDelete => {
                let backup = self
                    .backup_path
                    .clone()
                    .ok_or_else(|| Error::NoBackupAvailable(self.target.clone()))?;
                apply_compensation(
                    &CompensatingAction::RestoreCopy {
                        backup,
                        target: self.target.clone(),
                    },
                    fs,
                )?;
                if let Some(mode) = self.original_permissions {
                    apply_compensation(
                        &CompensatingAction::RestoreMode {
                            path: self.target.clone(),
                            mode,
                        },
                        fs,
                    )?;
                }
                Ok(())
            }
            RollbackOpKind::DirectoryCreate => {
                apply_compensation(&CompensatingAction::Rmdir(self.target.clone()), fs)
            }
            RollbackOpKind::PermissionChange => {
                let mode = self
                    .original_permissions
                    .ok_or_else(|| Error::NoBackupAvailable(self.target.clone()))?;
                apply_compensation(
                    &CompensatingAction::RestoreMode {
                        path: self.target.clone(),
                        mode,
                    },
                    fs,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::InMemoryFilesystem;
    use std::path::Path;

    #[test]
    fn unlink_if_exists_ignores_missing() {
        let fs = InMemoryFilesystem::new();
        let action = CompensatingAction::UnlinkIfExists(PathBuf::from("/missing"));
        assert!(apply_compensation(&action, &fs).is_ok());
    }

    #[test]
    fn restore_copy_brings_back_backup_and_removes_it() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/a.backup"), b"old").unwrap();
        fs.write(Path::new("/a"), b"new").unwrap();

        let action = CompensatingAction::RestoreCopy {
            backup: PathBuf::from("/a.backup"),
            target: PathBuf::from("/a"),
        };
        apply_compensation(&action, &fs).unwrap();

        assert_eq!(fs.read(Path::new("/a")).unwrap(), b"old");
        assert!(!fs.exists(Path::new("/a.backup")));
    }

    #[test]
    fn file_create_compensation_unlinks_target() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/new"), b"data").unwrap();

        let op = RollbackOperation {
            kind: RollbackOpKind::FileCreate,
            target: PathBuf::from("/new"),
            backup_path: None,
            original_permissions: None,
            timestamp: Utc::now(),
            operation_id: uuid::Uuid::new_v4(),
            operation_index: 0,
            steps: Vec::new(),
            completed: false,
        };

        op.compensate(&fs).unwrap();
        assert!(!fs.exists(Path::new("/new")));
    }

    #[test]
    fn overwrite_compensation_without_backup_fails() {
        let fs = InMemoryFilesystem::new();
        let op = RollbackOperation {
            kind: RollbackOpKind::FileOverwrite,
            target: PathBuf::from("/a"),
            backup_path: None,
            original_permissions: None,
            timestamp: Utc::now(),
            operation_id: uuid::Uuid::new_v4(),
            operation_index: 0,
            steps: Vec::new(),
            completed: false,
        };

        let err = op.compensate(&fs).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::NoBackupAvailable);
    }
}
