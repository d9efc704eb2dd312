// src/result.rs

//! The outcome of a single Creator/Writer/Reader/PermissionManager
//! operation (spec-3 "Operation result").

use crate::checksum::Checksum;
use crate::error::Error;
use crate::fs_ops::FileStats;
use crate::metrics::OperationKind;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OperationMetadata {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub sync_used: bool,
    pub retry_attempts: u32,
    pub backup_created: bool,
    pub backup_path: Option<PathBuf>,
    pub verified: bool,
    pub checksum: Option<Checksum>,
    pub from_cache: bool,
}

impl Default for OperationMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            end_time: now,
            sync_used: false,
            retry_attempts: 0,
            backup_created: false,
            backup_path: None,
            verified: false,
            checksum: None,
            from_cache: false,
        }
    }
}

#[derive(Debug)]
pub struct OperationResult {
    pub success: bool,
    pub kind: OperationKind,
    pub target: PathBuf,
    pub staged_temp_path: Option<PathBuf>,
    pub duration: Duration,
    pub bytes_processed: u64,
    pub stats: Option<FileStats>,
    pub error: Option<Error>,
    pub metadata: OperationMetadata,
}

impl OperationResult {
    pub fn success(kind: OperationKind, target: PathBuf, bytes_processed: u64) -> Self {
        Self {
            success: true,
            kind,
            target,
            staged_temp_path: None,
            duration: Duration::ZERO,
            bytes_processed,
            stats: None,
            error: None,
            metadata: OperationMetadata::default(),
        }
    }

    pub fn failure(kind: OperationKind, target: PathBuf, error: Error) -> Self {
        Self {
            success: false,
            kind,
            target,
            staged_temp_path: None,
            duration: Duration::ZERO,
            bytes_processed: 0,
            stats: None,
            error: Some(error),
            metadata: OperationMetadata::default(),
        }
    }
}
