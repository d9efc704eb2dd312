// src/error.rs

//! Structured error taxonomy for the atomic file operations engine.
//!
//! Every failure is a value, never an exception thrown across a suspension
//! point: operations capture the failure, trigger rollback of their own
//! journaled steps, and return the error as part of the operation result.

use std::path::PathBuf;
use thiserror::Error as ThisError;

/// Canonical error code, stable across versions, suitable for programmatic
/// dispatch by callers (see spec-external error taxonomy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FileNotFound,
    AlreadyExists,
    PermissionDenied,
    TempFileCreationFailed,
    WriteFailed,
    SyncFailed,
    RenameFailed,
    CleanupFailed,
    Timeout,
    RollbackFailed,
    RollbackPartialFailure,
    InvalidOperation,
    DiskFull,
    LockFailed,
    FileTooLarge,
    VerificationFailed,
    JsonSerializationError,
    SchemaValidationError,
    Cancelled,
    NoBackupAvailable,
    TransactionNotFound,
    TransactionClosed,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FileNotFound => "file-not-found",
            Self::AlreadyExists => "already-exists",
            Self::PermissionDenied => "permission-denied",
            Self::TempFileCreationFailed => "temp-file-creation-failed",
            Self::WriteFailed => "write-failed",
            Self::SyncFailed => "sync-failed",
            Self::RenameFailed => "rename-failed",
            Self::CleanupFailed => "cleanup-failed",
            Self::Timeout => "timeout",
            Self::RollbackFailed => "rollback-failed",
            Self::RollbackPartialFailure => "rollback-partial-failure",
            Self::InvalidOperation => "invalid-operation",
            Self::DiskFull => "disk-full",
            Self::LockFailed => "lock-failed",
            Self::FileTooLarge => "file-too-large",
            Self::VerificationFailed => "verification-failed",
            Self::JsonSerializationError => "json-serialization-error",
            Self::SchemaValidationError => "schema-validation-error",
            Self::Cancelled => "cancelled",
            Self::NoBackupAvailable => "no-backup-available",
            Self::TransactionNotFound => "transaction-not-found",
            Self::TransactionClosed => "transaction-closed",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The engine's error type. Each variant maps to exactly one canonical
/// [`ErrorCode`] via [`Error::code`].
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("permission denied: {path}: {source}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create temp file for {target}: {source}")]
    TempFileCreationFailed {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write failed for {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fsync failed for {path}: {source}")]
    SyncFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rename failed ({from} -> {to}): {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cleanup failed for {path}: {source}")]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("operation on {path} timed out after {elapsed_ms} ms")]
    Timeout { path: PathBuf, elapsed_ms: u64 },

    #[error("rollback step failed: {reason}")]
    RollbackFailed { reason: String },

    #[error("rollback completed with {failed_steps} failing step(s)")]
    RollbackPartialFailure { failed_steps: usize },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("disk full writing {path}: {source}")]
    DiskFull {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to acquire lock: {0}")]
    LockFailed(String),

    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("verification failed for {path}: {reason}")]
    VerificationFailed { path: PathBuf, reason: String },

    #[error("JSON serialization failed: {0}")]
    JsonSerializationError(#[from] serde_json::Error),

    #[error("schema validation failed: {0}")]
    SchemaValidationError(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("no backup available to compensate for {0}")]
    NoBackupAvailable(PathBuf),

    #[error("transaction not found: {0}")]
    TransactionNotFound(uuid::Uuid),

    #[error("cannot add operations to {status} transaction {id}")]
    TransactionClosed { id: uuid::Uuid, status: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The canonical, stable error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::FileNotFound(_) => ErrorCode::FileNotFound,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::TempFileCreationFailed { .. } => ErrorCode::TempFileCreationFailed,
            Self::WriteFailed { .. } => ErrorCode::WriteFailed,
            Self::SyncFailed { .. } => ErrorCode::SyncFailed,
            Self::RenameFailed { .. } => ErrorCode::RenameFailed,
            Self::CleanupFailed { .. } => ErrorCode::CleanupFailed,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::RollbackFailed { .. } => ErrorCode::RollbackFailed,
            Self::RollbackPartialFailure { .. } => ErrorCode::RollbackPartialFailure,
            Self::InvalidOperation(_) => ErrorCode::InvalidOperation,
            Self::DiskFull { .. } => ErrorCode::DiskFull,
            Self::LockFailed(_) => ErrorCode::LockFailed,
            Self::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            Self::VerificationFailed { .. } => ErrorCode::VerificationFailed,
            Self::JsonSerializationError(_) => ErrorCode::JsonSerializationError,
            Self::SchemaValidationError(_) => ErrorCode::SchemaValidationError,
            Self::Cancelled(_) => ErrorCode::Cancelled,
            Self::NoBackupAvailable(_) => ErrorCode::NoBackupAvailable,
            Self::TransactionNotFound(_) => ErrorCode::TransactionNotFound,
            Self::TransactionClosed { .. } => ErrorCode::TransactionClosed,
            // A bare io::Error reaching the top is classified by its kind.
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
                _ => ErrorCode::InvalidOperation,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_variant() {
        let e = Error::FileNotFound(PathBuf::from("/tmp/x"));
        assert_eq!(e.code().as_str(), "file-not-found");

        let e = Error::FileTooLarge { size: 10, limit: 5 };
        assert_eq!(e.code().as_str(), "file-too-large");
    }

    #[test]
    fn io_error_classified_by_kind() {
        let io_err = std::io::Error::from(std::io::ErrorKind::NotFound);
        let e: Error = io_err.into();
        assert_eq!(e.code(), ErrorCode::FileNotFound);
    }
}
