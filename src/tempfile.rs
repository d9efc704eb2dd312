// src/tempfile.rs

//! Registry of in-flight staging files, with periodic reaping of abandoned
//! and stale entries and graceful-shutdown semantics (spec-4.3).
//!
//! Grounded on the orphan-file recovery idiom in the pack's
//! `libretto-lockfile` atomic writer (`other_examples/...atomic.rs`):
//! a directory scan for files matching a naming convention, cross-checked
//! against an in-process "this one is still live" set.

use crate::error::{Error, Result};
use crate::fs_ops::Filesystem;
use crate::options::OperationOptions;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Fields owned exclusively by the tracker; referenced weakly (by id) from
/// the operation that allocated the staging path.
#[derive(Debug, Clone)]
pub struct TempRecord {
    pub staging_path: PathBuf,
    pub target_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub creator_pid: u32,
    pub operation_id: Uuid,
    pub cleanup_timeout: Duration,
}

impl TempRecord {
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    pub fn is_abandoned(&self) -> bool {
        self.age().to_std().unwrap_or_default() > self.cleanup_timeout
    }
}

/// Compute the on-disk staging path for a target, per spec-6's naming
/// convention: `"{prefix}{operationId}{suffix}"`, or, when a base name is
/// worth keeping for readability, `"{prefix}{baseName}-{operationId}{suffix}"`.
pub fn temp_path_for(target: &Path, operation_id: Uuid, options: &OperationOptions) -> PathBuf {
    let dir = options
        .temp_dir
        .clone()
        .or_else(|| target.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let file_name = match target.file_name().and_then(|n| n.to_str()) {
        Some(base) => format!(
            "{}{}-{}{}",
            options.temp_prefix, base, operation_id, options.temp_suffix
        ),
        None => format!("{}{}{}", options.temp_prefix, operation_id, options.temp_suffix),
    };

    dir.join(file_name)
}

pub struct TempFileTracker {
    active: Mutex<HashMap<Uuid, TempRecord>>,
    shutting_down: std::sync::atomic::AtomicBool,
}

impl Default for TempFileTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TempFileTracker {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Allocate and register a staging path for `target`. Does not touch the
    /// filesystem; the caller (Creator/Writer) performs the actual write.
    pub fn create_temp(&self, target: &Path, options: &OperationOptions) -> Result<TempRecord> {
        if self.shutting_down.load(std::sync::atomic::Ordering::Acquire) {
            return Err(Error::InvalidOperation(
                "temp file tracker is shutting down".to_string(),
            ));
        }

        let operation_id = Uuid::new_v4();
        let staging_path = temp_path_for(target, operation_id, options);

        let record = TempRecord {
            staging_path,
            target_path: target.to_path_buf(),
            created_at: Utc::now(),
            creator_pid: std::process::id(),
            operation_id,
            cleanup_timeout: options.operation_timeout,
        };

        self.active.lock().insert(operation_id, record.clone());
        Ok(record)
    }

    /// Successful completion: the staging file has already become the
    /// target (by rename), so just drop the bookkeeping entry.
    pub fn promote(&self, operation_id: Uuid) {
        self.active.lock().remove(&operation_id);
    }

    /// Failure path: unlink the staging file, if still present, and drop
    /// the bookkeeping entry.
    pub fn cleanup(&self, operation_id: Uuid, fs: &dyn Filesystem) -> Result<()> {
        let record = self.active.lock().remove(&operation_id);
        if let Some(record) = record {
            if fs.exists(&record.staging_path) {
                fs.unlink(&record.staging_path).map_err(|source| Error::CleanupFailed {
                    path: record.staging_path,
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Unlink and untrack every record whose age exceeds its own
    /// `cleanup_timeout`.
    pub fn cleanup_abandoned(&self, fs: &dyn Filesystem) -> usize {
        let abandoned: Vec<TempRecord> = {
            let active = self.active.lock();
            active.values().filter(|r| r.is_abandoned()).cloned().collect()
        };

        let mut cleaned = 0;
        for record in abandoned {
            if fs.exists(&record.staging_path) {
                if let Err(e) = fs.unlink(&record.staging_path) {
                    tracing::warn!(
                        path = %record.staging_path.display(),
                        error = %e,
                        "failed to unlink abandoned temp file"
                    );
                    continue;
                }
            }
            self.active.lock().remove(&record.operation_id);
            cleaned += 1;
        }
        cleaned
    }

    /// Scan `dir` for files matching the naming convention whose operation
    /// id has no live tracking record, and are older than `max_age`.
    pub fn cleanup_stale(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
        max_age: Duration,
        fs: &dyn Filesystem,
    ) -> Result<usize> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::Io(e)),
        };

        let active_ids: std::collections::HashSet<Uuid> = self.active.lock().keys().copied().collect();
        let mut cleaned = 0;

        for entry in entries {
            let entry = entry.map_err(Error::Io)?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(prefix) || !name.ends_with(suffix) {
                continue;
            }

            let trimmed = &name[prefix.len()..name.len() - suffix.len()];
            let candidate = trimmed.rsplit('-').next().unwrap_or(trimmed);
            let Ok(operation_id) = Uuid::parse_str(candidate) else {
                continue;
            };
            if active_ids.contains(&operation_id) {
                continue;
            }

            let age_ok = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|m| m.elapsed().ok())
                .map(|elapsed| elapsed > max_age)
                .unwrap_or(true);
            if !age_ok {
                continue;
            }

            if fs.unlink(&path).is_ok() {
                cleaned += 1;
            }
        }

        Ok(cleaned)
    }

    pub fn list_active(&self) -> Vec<TempRecord> {
        self.active.lock().values().cloned().collect()
    }

    /// Refuse new `create_temp` calls, unlink every tracked temp file
    /// best-effort, and report how many were cleaned.
    pub fn shutdown(&self, fs: &dyn Filesystem) -> usize {
        self.shutting_down.store(true, std::sync::atomic::Ordering::Release);
        let records: Vec<TempRecord> = self.active.lock().drain().map(|(_, r)| r).collect();

        let mut cleaned = 0;
        for record in records {
            if fs.exists(&record.staging_path) {
                match fs.unlink(&record.staging_path) {
                    Ok(()) => cleaned += 1,
                    Err(e) => tracing::warn!(
                        path = %record.staging_path.display(),
                        error = %e,
                        "failed to unlink temp file during shutdown"
                    ),
                }
            }
        }
        cleaned
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(std::sync::atomic::Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::InMemoryFilesystem;

    #[test]
    fn create_temp_registers_and_promote_untracks() {
        let tracker = TempFileTracker::new();
        let options = OperationOptions::default();
        let record = tracker.create_temp(Path::new("/t/a.txt"), &options).unwrap();

        assert_eq!(tracker.list_active().len(), 1);
        tracker.promote(record.operation_id);
        assert_eq!(tracker.list_active().len(), 0);
    }

    #[test]
    fn cleanup_unlinks_staging_file() {
        let tracker = TempFileTracker::new();
        let fs = InMemoryFilesystem::new();
        let options = OperationOptions::default();
        let record = tracker.create_temp(Path::new("/t/a.txt"), &options).unwrap();

        fs.write(&record.staging_path, b"partial").unwrap();
        tracker.cleanup(record.operation_id, &fs).unwrap();

        assert!(!fs.exists(&record.staging_path));
        assert_eq!(tracker.list_active().len(), 0);
    }

    #[test]
    fn shutdown_refuses_new_temp_files() {
        let tracker = TempFileTracker::new();
        let fs = InMemoryFilesystem::new();
        tracker.shutdown(&fs);

        let options = OperationOptions::default();
        let err = tracker.create_temp(Path::new("/t/a.txt"), &options).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidOperation);
    }

    #[test]
    fn temp_path_includes_base_name_and_operation_id() {
        let options = OperationOptions::default();
        let id = Uuid::new_v4();
        let path = temp_path_for(Path::new("/t/a.txt"), id, &options);

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".tmp-a.txt-"));
        assert!(name.ends_with(".tmp"));
        assert!(name.contains(&id.to_string()));
    }
}
