// src/transaction.rs

//! Transaction lifecycle: begin, append operations, checkpoint, commit,
//! rollback (spec-4.5, spec-4.7 "Transaction state machine").
//!
//! Grounded on the teacher's `TransactionEngine`/`Transaction` state
//! machine (`New -> Planned -> ... -> Done`, with `Aborted`/`Failed` side
//! states) and its lock-retry idiom in `TransactionEngine::begin`, but
//! generalized: this engine has no database half to straddle, so the
//! states collapse to the three the spec actually asks for
//! (`active`/`committed`/`rolled_back`, plus `failed`), and operations are
//! held in memory rather than journaled to disk — crash recovery for a
//! single in-flight transaction is out of scope here (spec-1 lists no
//! durable-journal component among the four the spec covers).

use crate::error::{Error, Result};
use crate::fs_ops::Filesystem;
use crate::rollback::RollbackOperation;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use uuid::Uuid;

const HISTORY_CAPACITY: usize = 1000;
const RETENTION_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    RolledBack,
    Failed,
}

impl TransactionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub operations: Vec<RollbackOperation>,
    pub start_time: DateTime<Utc>,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub checkpoints: Vec<String>,
}

impl Transaction {
    /// Resolve a checkpoint name to the operation index it was recorded at.
    /// Name collisions are allowed; the *first* match wins (spec-4.5).
    pub fn checkpoint_index(&self, name: &str) -> Option<usize> {
        self.checkpoints.iter().find_map(|entry| {
            let (cp_name, idx) = entry.rsplit_once(':')?;
            if cp_name == name {
                idx.parse().ok()
            } else {
                None
            }
        })
    }
}

/// Outcome of a rollback call.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub status: TransactionStatus,
    pub failed_steps: usize,
}

struct CommittedEntry {
    transaction: Transaction,
    committed_at: Instant,
}

pub struct TransactionManager {
    active: Mutex<HashMap<Uuid, Transaction>>,
    recently_committed: Mutex<HashMap<Uuid, CommittedEntry>>,
    history: Mutex<VecDeque<RollbackOperation>>,
    retention: Duration,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            recently_committed: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            retention: RETENTION_WINDOW,
        }
    }

    pub fn begin(&self, description: Option<String>) -> Uuid {
        let id = Uuid::new_v4();
        let txn = Transaction {
            id,
            operations: Vec::new(),
            start_time: Utc::now(),
            status: TransactionStatus::Active,
            description,
            checkpoints: Vec::new(),
        };
        self.active.lock().insert(id, txn);
        id
    }

    /// Append an operation, assigning its `operation_index` as the current
    /// length of the operations array before append. Returns the index.
    pub fn add_operation(&self, txn_id: Uuid, mut op: RollbackOperation) -> Result<usize> {
        self.evict_expired_retention();
        let mut active = self.active.lock();
        let txn = active.get_mut(&txn_id).ok_or(Error::TransactionNotFound(txn_id))?;

        let index = txn.operations.len();
        op.operation_index = index;
        txn.operations.push(op);
        Ok(index)
    }

    /// Append `"<name>:<operationIndex>"` to the transaction's checkpoints.
    pub fn create_checkpoint(&self, txn_id: Uuid, name: &str) -> Result<()> {
        let mut active = self.active.lock();
        let txn = active.get_mut(&txn_id).ok_or(Error::TransactionNotFound(txn_id))?;
        let index = txn.operations.len();
        txn.checkpoints.push(format!("{name}:{index}"));
        Ok(())
    }

    /// Move operations into the history ring, demote the transaction into
    /// the short-lived "recently committed" set, and mark it committed.
    pub fn commit(&self, txn_id: Uuid) -> Result<()> {
        self.evict_expired_retention();
        let mut txn = {
            let mut active = self.active.lock();
            active.remove(&txn_id).ok_or(Error::TransactionNotFound(txn_id))?
        };

        {
            let mut history = self.history.lock();
            for op in txn.operations.drain(..) {
                if history.len() >= HISTORY_CAPACITY {
                    history.pop_front();
                }
                history.push_back(op);
            }
        }

        txn.status = TransactionStatus::Committed;
        self.recently_committed.lock().insert(
            txn_id,
            CommittedEntry {
                transaction: txn,
                committed_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Roll back a transaction, either entirely or to a named checkpoint.
    /// Operations are undone in reverse order; failures are collected but
    /// do not stop the sweep (spec-4.5).
    pub fn rollback(
        &self,
        txn_id: Uuid,
        to_checkpoint: Option<&str>,
        fs: &dyn Filesystem,
    ) -> Result<RollbackOutcome> {
        self.evict_expired_retention();
        let mut txn = {
            let mut active = self.active.lock();
            active.remove(&txn_id).ok_or(Error::TransactionNotFound(txn_id))?
        };

        let from_index = match to_checkpoint {
            Some(name) => txn.checkpoint_index(name).unwrap_or(0),
            None => 0,
        };

        let to_undo = &txn.operations[from_index..];
        let mut failed_steps = 0;
        for op in to_undo.iter().rev() {
            if let Err(e) = op.compensate(fs) {
                tracing::warn!(
                    target = %op.target.display(),
                    error = %e,
                    "transaction rollback step failed"
                );
                failed_steps += 1;
            }
        }

        txn.operations.truncate(from_index);
        txn.status = if failed_steps == 0 {
            TransactionStatus::RolledBack
        } else {
            TransactionStatus::Failed
        };

        let status = txn.status;
        {
            let mut history = self.history.lock();
            for op in std::mem::take(&mut txn.operations) {
                if history.len() >= HISTORY_CAPACITY {
                    history.pop_front();
                }
                history.push_back(op);
            }
        }

        if failed_steps > 0 {
            return Err(Error::RollbackPartialFailure { failed_steps });
        }

        Ok(RollbackOutcome { status, failed_steps })
    }

    pub fn list_active(&self) -> Vec<Uuid> {
        self.active.lock().keys().copied().collect()
    }

    pub fn get_history(&self, limit: usize) -> Vec<RollbackOperation> {
        let history = self.history.lock();
        history.iter().rev().take(limit).cloned().collect()
    }

    /// Distinguish "never existed" from "already closed" for callers
    /// probing a transaction id before retrying an `add_operation` call.
    pub fn describe_closed(&self, txn_id: Uuid) -> Option<Error> {
        self.evict_expired_retention();
        self.recently_committed
            .lock()
            .get(&txn_id)
            .map(|entry| Error::TransactionClosed {
                id: txn_id,
                status: entry.transaction.status.as_str(),
            })
    }

    fn evict_expired_retention(&self) {
        let retention = self.retention;
        self.recently_committed
            .lock()
            .retain(|_, entry| entry.committed_at.elapsed() < retention);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::InMemoryFilesystem;
    use crate::rollback::RollbackOpKind;
    use std::path::PathBuf;

    fn create_op(target: &str, index: usize) -> RollbackOperation {
        RollbackOperation {
            kind: RollbackOpKind::FileCreate,
            target: PathBuf::from(target),
            backup_path: None,
            original_permissions: None,
            timestamp: Utc::now(),
            operation_id: Uuid::new_v4(),
            operation_index: index,
            steps: Vec::new(),
            completed: true,
        }
    }

    #[test]
    fn begin_add_commit_moves_to_history() {
        let mgr = TransactionManager::new();
        let txn_id = mgr.begin(Some("test".to_string()));

        let idx = mgr.add_operation(txn_id, create_op("/t/1", 0)).unwrap();
        assert_eq!(idx, 0);

        mgr.commit(txn_id).unwrap();
        assert!(mgr.list_active().is_empty());
        assert_eq!(mgr.get_history(10).len(), 1);
    }

    #[test]
    fn rollback_undoes_in_reverse_order() {
        let mgr = TransactionManager::new();
        let fs = InMemoryFilesystem::new();
        let txn_id = mgr.begin(None);

        fs.write(std::path::Path::new("/t/1"), b"A").unwrap();
        fs.write(std::path::Path::new("/t/2"), b"B").unwrap();
        mgr.add_operation(txn_id, create_op("/t/1", 0)).unwrap();
        mgr.add_operation(txn_id, create_op("/t/2", 1)).unwrap();

        let outcome = mgr.rollback(txn_id, None, &fs).unwrap();
        assert_eq!(outcome.status, TransactionStatus::RolledBack);
        assert!(!fs.exists(std::path::Path::new("/t/1")));
        assert!(!fs.exists(std::path::Path::new("/t/2")));
    }

    #[test]
    fn checkpoint_rollback_keeps_earlier_operations() {
        let mgr = TransactionManager::new();
        let fs = InMemoryFilesystem::new();
        let txn_id = mgr.begin(None);

        fs.write(std::path::Path::new("/t/1"), b"A").unwrap();
        mgr.add_operation(txn_id, create_op("/t/1", 0)).unwrap();
        mgr.create_checkpoint(txn_id, "mid").unwrap();

        fs.write(std::path::Path::new("/t/2"), b"B").unwrap();
        mgr.add_operation(txn_id, create_op("/t/2", 1)).unwrap();

        mgr.rollback(txn_id, Some("mid"), &fs).unwrap();

        assert!(fs.exists(std::path::Path::new("/t/1")));
        assert!(!fs.exists(std::path::Path::new("/t/2")));
    }

    #[test]
    fn add_operation_to_unknown_transaction_fails() {
        let mgr = TransactionManager::new();
        let err = mgr.add_operation(Uuid::new_v4(), create_op("/t/1", 0)).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::TransactionNotFound);
    }

    #[test]
    fn describe_closed_distinguishes_retention_window() {
        let mgr = TransactionManager::new();
        let txn_id = mgr.begin(None);
        mgr.commit(txn_id).unwrap();

        let err = mgr.describe_closed(txn_id).unwrap();
        assert_eq!(err.code(), crate::error::ErrorCode::TransactionClosed);

        assert!(mgr.describe_closed(Uuid::new_v4()).is_none());
    }
}
