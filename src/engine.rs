// src/engine.rs

//! Top-level `Engine`: bundles every collaborator and exposes the public
//! async surface (spec-5 "Concurrency model"). Each collaborator is
//! synchronous; `Engine` dispatches through `tokio::task::spawn_blocking`
//! so the engine composes with an async caller without requiring every
//! collaborator (and the `Filesystem` trait beneath them) to be async.

use crate::backup::BackupStore;
use crate::checksum::ChecksumAlgorithm;
use crate::creator::Creator;
use crate::deleter::Deleter;
use crate::error::{Error, Result};
use crate::fs_ops::{Filesystem, RealFilesystem};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::options::OperationOptions;
use crate::permissions::PermissionManager;
use crate::progress::ProgressTracker;
use crate::reader::{ReadResult, Reader};
use crate::result::OperationResult;
use crate::rollback::RollbackOperation;
use crate::tempfile::TempFileTracker;
use crate::transaction::{RollbackOutcome, TransactionManager};
use crate::writer::Writer;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use uuid::Uuid;

static PANIC_HOOK_INSTALLED: Once = Once::new();

/// Configuration for building an [`Engine`]. Distinct from
/// [`OperationOptions`], which is per-call.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub default_options: OperationOptions,
}

struct Inner {
    fs: Arc<dyn Filesystem>,
    tracker: TempFileTracker,
    metrics: EngineMetrics,
    transactions: TransactionManager,
    default_options: OperationOptions,
}

/// The engine's public surface. Cheap to clone: everything behind an
/// `Arc`, matching the teacher's pattern of a thin handle type wrapping a
/// shared, lock-guarded core.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_filesystem(Arc::new(RealFilesystem), config)
    }

    pub fn with_filesystem(fs: Arc<dyn Filesystem>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                fs,
                tracker: TempFileTracker::new(),
                metrics: EngineMetrics::new(),
                transactions: TransactionManager::new(),
                default_options: config.default_options,
            }),
        }
    }

    fn options<'a>(&self, overrides: Option<&'a OperationOptions>) -> OperationOptions {
        overrides.cloned().unwrap_or_else(|| self.inner.default_options.clone())
    }

    pub async fn create(&self, path: PathBuf, content: Vec<u8>, options: Option<OperationOptions>) -> OperationResult {
        let engine = self.inner.clone();
        let options = self.options(options.as_ref());
        tokio::task::spawn_blocking(move || {
            let creator = Creator::new(engine.fs.as_ref(), &engine.tracker, &engine.metrics);
            creator.create(&path, &content, &options)
        })
        .await
        .unwrap_or_else(|e| OperationResult::failure(
            crate::metrics::OperationKind::Create,
            PathBuf::new(),
            Error::InvalidOperation(format!("create task panicked: {e}")),
        ))
    }

    pub async fn write(&self, path: PathBuf, content: Vec<u8>, options: Option<OperationOptions>) -> OperationResult {
        let engine = self.inner.clone();
        let options = self.options(options.as_ref());
        tokio::task::spawn_blocking(move || {
            let writer = Writer::new(engine.fs.as_ref(), &engine.tracker, &engine.metrics);
            writer.write(&path, &content, &options)
        })
        .await
        .unwrap_or_else(|e| OperationResult::failure(
            crate::metrics::OperationKind::Write,
            PathBuf::new(),
            Error::InvalidOperation(format!("write task panicked: {e}")),
        ))
    }

    pub async fn append(&self, path: PathBuf, content: Vec<u8>, options: Option<OperationOptions>) -> OperationResult {
        let engine = self.inner.clone();
        let options = self.options(options.as_ref());
        tokio::task::spawn_blocking(move || {
            let writer = Writer::new(engine.fs.as_ref(), &engine.tracker, &engine.metrics);
            writer.append(&path, &content, &options)
        })
        .await
        .unwrap_or_else(|e| OperationResult::failure(
            crate::metrics::OperationKind::Write,
            PathBuf::new(),
            Error::InvalidOperation(format!("append task panicked: {e}")),
        ))
    }

    pub async fn write_json<T>(&self, path: PathBuf, value: T, options: Option<OperationOptions>) -> OperationResult
    where
        T: serde::Serialize + Send + 'static,
    {
        let engine = self.inner.clone();
        let options = self.options(options.as_ref());
        tokio::task::spawn_blocking(move || {
            let writer = Writer::new(engine.fs.as_ref(), &engine.tracker, &engine.metrics);
            writer.write_json(&path, &value, &options)
        })
        .await
        .unwrap_or_else(|e| OperationResult::failure(
            crate::metrics::OperationKind::Write,
            PathBuf::new(),
            Error::InvalidOperation(format!("write_json task panicked: {e}")),
        ))
    }

    pub async fn write_many(
        &self,
        items: Vec<(PathBuf, Vec<u8>)>,
        options: Option<OperationOptions>,
        stop_on_error: bool,
        progress: Option<Arc<dyn ProgressTracker>>,
    ) -> Vec<OperationResult> {
        let engine = self.inner.clone();
        let options = self.options(options.as_ref());
        tokio::task::spawn_blocking(move || {
            let writer = Writer::new(engine.fs.as_ref(), &engine.tracker, &engine.metrics);
            let refs: Vec<(&Path, &[u8])> = items.iter().map(|(p, c)| (p.as_path(), c.as_slice())).collect();
            writer.write_many(&refs, &options, stop_on_error, progress.as_deref())
        })
        .await
        .unwrap_or_default()
    }

    pub async fn delete(&self, path: PathBuf, options: Option<OperationOptions>) -> OperationResult {
        let engine = self.inner.clone();
        let options = self.options(options.as_ref());
        tokio::task::spawn_blocking(move || {
            let deleter = Deleter::new(engine.fs.as_ref(), &engine.metrics);
            deleter.delete(&path, &options)
        })
        .await
        .unwrap_or_else(|e| OperationResult::failure(
            crate::metrics::OperationKind::Delete,
            PathBuf::new(),
            Error::InvalidOperation(format!("delete task panicked: {e}")),
        ))
    }

    pub async fn read(&self, path: PathBuf) -> Result<ReadResult> {
        let engine = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let reader = Reader::new(engine.fs.as_ref());
            reader.read(&path)
        })
        .await
        .map_err(|e| Error::InvalidOperation(format!("read task panicked: {e}")))?
    }

    pub async fn read_with_checksum(&self, path: PathBuf, algorithm: ChecksumAlgorithm) -> Result<ReadResult> {
        let engine = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let reader = Reader::new(engine.fs.as_ref());
            reader.read_with_checksum(&path, algorithm)
        })
        .await
        .map_err(|e| Error::InvalidOperation(format!("read task panicked: {e}")))?
    }

    pub async fn change_mode(&self, path: PathBuf, mode: u32) -> Result<RollbackOperation> {
        let engine = self.inner.clone();
        tokio::task::spawn_blocking(move || PermissionManager::change_mode(&path, mode, engine.fs.as_ref()))
            .await
            .map_err(|e| Error::InvalidOperation(format!("change_mode task panicked: {e}")))?
    }

    pub async fn change_ownership(&self, path: PathBuf, uid: u32, gid: u32) -> Result<()> {
        let engine = self.inner.clone();
        tokio::task::spawn_blocking(move || PermissionManager::change_ownership(&path, uid, gid, engine.fs.as_ref()))
            .await
            .map_err(|e| Error::InvalidOperation(format!("change_ownership task panicked: {e}")))?
    }

    pub fn begin_transaction(&self, description: Option<String>) -> Uuid {
        self.inner.transactions.begin(description)
    }

    pub fn add_operation(&self, txn_id: Uuid, op: RollbackOperation) -> Result<usize> {
        self.inner.transactions.add_operation(txn_id, op)
    }

    pub fn checkpoint(&self, txn_id: Uuid, name: &str) -> Result<()> {
        self.inner.transactions.create_checkpoint(txn_id, name)
    }

    pub fn commit(&self, txn_id: Uuid) -> Result<()> {
        self.inner.transactions.commit(txn_id)
    }

    pub async fn rollback(&self, txn_id: Uuid, to_checkpoint: Option<String>) -> Result<RollbackOutcome> {
        let engine = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            engine
                .transactions
                .rollback(txn_id, to_checkpoint.as_deref(), engine.fs.as_ref())
        })
        .await
        .map_err(|e| Error::InvalidOperation(format!("rollback task panicked: {e}")))?
    }

    pub fn list_active_transactions(&self) -> Vec<Uuid> {
        self.inner.transactions.list_active()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Rotate backups for `base_name`/`ext` under `directory`, keeping at
    /// most `max_kept`. Exposed directly since rotation is a maintenance
    /// operation, not part of the create/write hot path.
    pub async fn rotate_backups(&self, directory: PathBuf, base_name: String, ext: String, max_kept: usize) {
        let engine = self.inner.clone();
        let _ = tokio::task::spawn_blocking(move || {
            BackupStore::rotate(&directory, &base_name, &ext, max_kept, engine.fs.as_ref());
        })
        .await;
    }

    /// Stop accepting new temp files and best-effort unlink everything
    /// still tracked. Returns the number of files cleaned up.
    pub async fn shutdown(&self) -> usize {
        let engine = self.inner.clone();
        tokio::task::spawn_blocking(move || engine.tracker.shutdown(engine.fs.as_ref()))
            .await
            .unwrap_or(0)
    }

    /// Spawn the background reaper: on every tick, sweep abandoned temp
    /// files, then stale ones left behind on disk by a prior process
    /// (spec-4.3: "a background timer ticks periodically... runs
    /// cleanupAbandoned followed by cleanupStale"). Stale-file scanning
    /// only runs when `default_options.temp_dir` names a fixed staging
    /// directory; per-call staging that defaults to each target's own
    /// parent has no single directory to scan. Stops once the tracker
    /// enters shutdown; callers should also abort the returned handle.
    pub fn start_reaper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let engine = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if engine.tracker.is_shutting_down() {
                    break;
                }

                let engine = engine.clone();
                let _ = tokio::task::spawn_blocking(move || {
                    let abandoned = engine.tracker.cleanup_abandoned(engine.fs.as_ref());
                    if abandoned > 0 {
                        tracing::debug!(count = abandoned, "reaper cleaned up abandoned temp files");
                    }

                    if let Some(dir) = engine.default_options.temp_dir.clone() {
                        match engine.tracker.cleanup_stale(
                            &dir,
                            &engine.default_options.temp_prefix,
                            &engine.default_options.temp_suffix,
                            engine.default_options.operation_timeout,
                            engine.fs.as_ref(),
                        ) {
                            Ok(count) if count > 0 => {
                                tracing::debug!(count, "reaper cleaned up stale temp files");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(error = %e, "reaper stale scan failed"),
                        }
                    }
                })
                .await;
            }
        })
    }

    /// Run the reaper until a Ctrl-C/SIGINT arrives, then shut down the
    /// tracker and return how many temp files were cleaned on exit.
    /// Mirrors the teacher daemon's `tokio::signal::ctrl_c()` shutdown
    /// branch in `run_daemon`.
    pub async fn run_with_reaper(&self, interval: Duration) -> usize {
        let reaper = self.start_reaper(interval);
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, cleaning up tracked temp files");
        let cleaned = self.shutdown().await;
        reaper.abort();
        cleaned
    }

    /// Install a process-wide panic hook that best-effort unlinks every
    /// currently tracked staging file before re-raising through whatever
    /// hook was previously installed (spec-4.3: process-exit handlers for
    /// "uncaught failure"). Idempotent per process; later calls from other
    /// `Engine` instances are no-ops, so only the first engine constructed
    /// gets panic-time cleanup — document this limitation for multi-engine
    /// processes rather than silently overwrite one engine's hook with
    /// another's.
    pub fn install_panic_cleanup(&self) {
        let engine = self.inner.clone();
        PANIC_HOOK_INSTALLED.call_once(|| {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                for record in engine.tracker.list_active() {
                    if engine.fs.exists(&record.staging_path) {
                        let _ = engine.fs.unlink(&record.staging_path);
                    }
                }
                previous(info);
            }));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::InMemoryFilesystem;

    fn test_engine() -> Engine {
        Engine::with_filesystem(Arc::new(InMemoryFilesystem::new()), EngineConfig::default())
    }

    #[tokio::test]
    async fn create_then_read_roundtrip() {
        let engine = test_engine();
        let result = engine
            .create(PathBuf::from("/a.txt"), b"hello".to_vec(), None)
            .await;
        assert!(result.success);

        let read = engine.read(PathBuf::from("/a.txt")).await.unwrap();
        assert_eq!(read.content, b"hello");
    }

    #[tokio::test]
    async fn write_then_rollback_transaction() {
        let engine = test_engine();
        let txn_id = engine.begin_transaction(Some("batch".to_string()));

        engine.write(PathBuf::from("/a.txt"), b"v1".to_vec(), None).await;
        let op = RollbackOperation {
            kind: crate::rollback::RollbackOpKind::FileCreate,
            target: PathBuf::from("/a.txt"),
            backup_path: None,
            original_permissions: None,
            timestamp: chrono::Utc::now(),
            operation_id: Uuid::new_v4(),
            operation_index: 0,
            steps: Vec::new(),
            completed: true,
        };
        engine.add_operation(txn_id, op).unwrap();

        let outcome = engine.rollback(txn_id, None).await.unwrap();
        assert_eq!(outcome.status, crate::transaction::TransactionStatus::RolledBack);
        assert!(engine.read(PathBuf::from("/a.txt")).await.is_err());
    }

    #[tokio::test]
    async fn create_then_delete_removes_target() {
        let engine = test_engine();
        engine.create(PathBuf::from("/a.txt"), b"hello".to_vec(), None).await;

        let result = engine.delete(PathBuf::from("/a.txt"), None).await;

        assert!(result.success);
        assert!(engine.read(PathBuf::from("/a.txt")).await.is_err());
    }

    #[tokio::test]
    async fn metrics_reflect_operations() {
        let engine = test_engine();
        engine.create(PathBuf::from("/a.txt"), b"x".to_vec(), None).await;

        let snapshot = engine.metrics();
        assert_eq!(snapshot.total_operations, 1);
        assert_eq!(snapshot.successful, 1);
    }

    #[tokio::test]
    async fn reaper_cleans_up_abandoned_temp_file() {
        let engine = test_engine();
        let options = OperationOptions {
            operation_timeout: Duration::from_millis(1),
            ..OperationOptions::default()
        };

        let record = engine.inner.tracker.create_temp(Path::new("/t/a.txt"), &options).unwrap();
        engine.inner.fs.write(&record.staging_path, b"orphan").unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let handle = engine.start_reaper(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();

        assert!(engine.inner.tracker.list_active().is_empty());
        assert!(!engine.inner.fs.exists(&record.staging_path));
    }

    #[tokio::test]
    async fn write_many_threads_progress_through_engine() {
        use crate::progress::SilentProgress;

        let engine = test_engine();
        let progress: Arc<dyn ProgressTracker> = Arc::new(SilentProgress::new());
        let items = vec![
            (PathBuf::from("/a"), b"1".to_vec()),
            (PathBuf::from("/b"), b"2".to_vec()),
        ];

        let results = engine.write_many(items, None, false, Some(progress.clone())).await;

        assert!(results.iter().all(|r| r.success));
        assert_eq!(progress.position(), 2);
    }
}
