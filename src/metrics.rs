// src/metrics.rs

//! Metrics snapshot consumed by an external observability collaborator
//! (spec-6: "Metrics consumer"). The plugin registry, health reporting,
//! and alerting built on top of this snapshot are out of scope; the
//! counters themselves are ambient, not a feature the Non-goals exclude.

use crate::error::ErrorCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Read,
    Write,
    Create,
    Delete,
    PermissionChange,
}

impl OperationKind {
    fn index(&self) -> usize {
        match self {
            Self::Read => 0,
            Self::Write => 1,
            Self::Create => 2,
            Self::Delete => 3,
            Self::PermissionChange => 4,
        }
    }
}

const OPERATION_KIND_COUNT: usize = 5;

#[derive(Debug, Default, Clone)]
pub struct MetricsSnapshot {
    pub total_operations: u64,
    pub successful: u64,
    pub failed: u64,
    pub avg_duration: Duration,
    pub total_bytes_processed: u64,
    pub ops_per_second: f64,
    pub total_fsync_calls: u64,
    pub total_retry_attempts: u64,
    pub error_stats: HashMap<&'static str, u64>,
    pub operation_types: HashMap<&'static str, u64>,
}

/// Atomic counters updated by Creator/Writer/PermissionManager on every
/// operation. Cheap enough to update unconditionally on the hot path.
pub struct EngineMetrics {
    total_operations: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    total_duration_ms: AtomicU64,
    total_bytes_processed: AtomicU64,
    total_fsync_calls: AtomicU64,
    total_retry_attempts: AtomicU64,
    error_stats: parking_lot::Mutex<HashMap<&'static str, u64>>,
    operation_types: [AtomicU64; OPERATION_KIND_COUNT],
    started_at: std::time::Instant,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            total_operations: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            total_bytes_processed: AtomicU64::new(0),
            total_fsync_calls: AtomicU64::new(0),
            total_retry_attempts: AtomicU64::new(0),
            error_stats: parking_lot::Mutex::new(HashMap::new()),
            operation_types: Default::default(),
            started_at: std::time::Instant::now(),
        }
    }

    pub fn record_success(&self, kind: OperationKind, duration: Duration, bytes: u64) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        self.total_bytes_processed.fetch_add(bytes, Ordering::Relaxed);
        self.operation_types[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: OperationKind, duration: Duration, code: ErrorCode) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        self.operation_types[kind.index()].fetch_add(1, Ordering::Relaxed);
        *self.error_stats.lock().entry(code.as_str()).or_insert(0) += 1;
    }

    pub fn record_fsync(&self) {
        self.total_fsync_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.total_retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_operations.load(Ordering::Relaxed);
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let avg_duration = if total > 0 {
            Duration::from_millis(total_duration_ms / total)
        } else {
            Duration::ZERO
        };

        let elapsed_secs = self.started_at.elapsed().as_secs_f64().max(f64::EPSILON);
        let ops_per_second = total as f64 / elapsed_secs;

        let mut operation_types = HashMap::new();
        for (kind, label) in [
            (OperationKind::Read, "read"),
            (OperationKind::Write, "write"),
            (OperationKind::Create, "create"),
            (OperationKind::Delete, "delete"),
            (OperationKind::PermissionChange, "permission_change"),
        ] {
            operation_types.insert(label, self.operation_types[kind.index()].load(Ordering::Relaxed));
        }

        MetricsSnapshot {
            total_operations: total,
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            avg_duration,
            total_bytes_processed: self.total_bytes_processed.load(Ordering::Relaxed),
            ops_per_second,
            total_fsync_calls: self.total_fsync_calls.load(Ordering::Relaxed),
            total_retry_attempts: self.total_retry_attempts.load(Ordering::Relaxed),
            error_stats: self.error_stats.lock().clone(),
            operation_types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_success_and_failure_counts() {
        let metrics = EngineMetrics::new();
        metrics.record_success(OperationKind::Create, Duration::from_millis(10), 6);
        metrics.record_failure(OperationKind::Write, Duration::from_millis(5), ErrorCode::FileTooLarge);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_operations, 2);
        assert_eq!(snapshot.successful, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.total_bytes_processed, 6);
        assert_eq!(snapshot.error_stats.get("file-too-large"), Some(&1));
        assert_eq!(snapshot.operation_types.get("create"), Some(&1));
    }
}
