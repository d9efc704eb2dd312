// src/lib.rs

//! Atomix: an atomic file operations engine.
//!
//! Create/read/write/delete/permission-change operations over a
//! POSIX-style filesystem with transactional, crash-consistent semantics.
//! A single operation is all-or-nothing: observers never see a truncated
//! or partially written target, only the prior contents or the fully
//! written new contents. Operations grouped into a [`transaction`] are
//! all-or-nothing as a unit, with named checkpoints for partial rollback.
//!
//! # Architecture
//!
//! - Temp-file + rename: every write lands through a staging file on the
//!   same filesystem as its target, promoted atomically by rename.
//! - Rollback journaling: every step taken during an operation is
//!   journaled with a compensating action, replayed in reverse on failure.
//! - Transactions: operations accumulate against a transaction id, support
//!   named checkpoints, and either commit (into a forensic history ring)
//!   or roll back (suffix of operations undone in reverse).
//! - Filesystem capability: every collaborator is polymorphic over a
//!   narrow [`fs_ops::Filesystem`] trait, so the whole engine runs against
//!   an in-memory double in tests without touching disk.

pub mod atomic;
pub mod backup;
pub mod checksum;
pub mod creator;
pub mod deleter;
pub mod engine;
mod error;
pub mod fs_ops;
pub mod io_util;
pub mod logging;
pub mod metrics;
pub mod options;
pub mod permissions;
pub mod progress;
pub mod reader;
pub mod result;
pub mod rollback;
pub mod tempfile;
pub mod transaction;
pub mod writer;

pub use backup::BackupStore;
pub use checksum::{Checksum, ChecksumAlgorithm, ChecksumError, Hasher};
pub use creator::Creator;
pub use deleter::Deleter;
pub use engine::{Engine, EngineConfig};
pub use error::{Error, ErrorCode, Result};
pub use fs_ops::{FileStats, Filesystem, InMemoryFilesystem, RealFilesystem};
pub use metrics::{EngineMetrics, MetricsSnapshot, OperationKind};
pub use options::{BackupPolicy, OperationOptions};
pub use permissions::PermissionManager;
pub use progress::{
    CallbackProgress, LogProgress, MultiProgress, ProgressEvent, ProgressStyle, ProgressTracker,
    SilentProgress,
};
pub use reader::{ReadResult, Reader};
pub use result::{OperationMetadata, OperationResult};
pub use rollback::{
    apply_compensation, rollback_steps, CompensatingAction, RollbackOpKind, RollbackOperation,
    RollbackStep, StepKind,
};
pub use tempfile::{temp_path_for, TempFileTracker, TempRecord};
pub use transaction::{RollbackOutcome, Transaction, TransactionManager, TransactionStatus};
pub use writer::Writer;
