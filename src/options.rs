// src/options.rs

//! Operation options shared by every Creator/Writer entry point.

use crate::checksum::ChecksumAlgorithm;
use std::path::PathBuf;
use std::time::Duration;

/// Backup policy for overwrite-style operations.
#[derive(Debug, Clone)]
pub struct BackupPolicy {
    /// Whether a backup of the pre-existing target is created before overwrite.
    pub create: bool,
    /// Directory backups are written to; defaults to alongside the target.
    pub directory: Option<PathBuf>,
    /// Number of rotated backups to retain per base name.
    pub max_kept: usize,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            create: false,
            directory: None,
            max_kept: 5,
        }
    }
}

/// Options consumed by every Creator/Writer operation (spec-3 "Operation options").
#[derive(Debug, Clone)]
pub struct OperationOptions {
    /// Force data-to-disk sync on the staged file before rename.
    pub durability: bool,
    /// Override the directory staging files are created in (default: target's parent).
    pub temp_dir: Option<PathBuf>,
    pub temp_prefix: String,
    pub temp_suffix: String,
    /// Maximum wall-clock age for a tracked temp file before it is reaped.
    pub operation_timeout: Duration,
    pub preserve_permissions: bool,
    pub preserve_ownership: bool,
    /// Streaming chunk size for payloads exceeding this many bytes.
    pub buffer_size: usize,
    pub retries: u32,
    pub retry_delay: Duration,
    pub backup_policy: BackupPolicy,
    pub verify_after_write: bool,
    pub verification_algorithm: ChecksumAlgorithm,
    /// Reject payloads exceeding this size before work begins.
    pub max_file_size: Option<u64>,
    /// `create`: fail instead of replacing an existing target.
    pub overwrite: bool,
    /// `write`/`append`: treat existing target content as a prefix to keep.
    pub append: bool,
    /// Mode applied to the target when there is no prior mode to preserve.
    pub mode: u32,
    /// Create missing ancestor directories (default on).
    pub create_parents: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            durability: true,
            temp_dir: None,
            temp_prefix: ".tmp-".to_string(),
            temp_suffix: ".tmp".to_string(),
            operation_timeout: Duration::from_secs(300),
            preserve_permissions: false,
            preserve_ownership: false,
            buffer_size: 64 * 1024,
            retries: 3,
            retry_delay: Duration::from_millis(100),
            backup_policy: BackupPolicy::default(),
            verify_after_write: false,
            verification_algorithm: ChecksumAlgorithm::Sha256,
            max_file_size: None,
            overwrite: false,
            append: false,
            mode: 0o644,
            create_parents: true,
        }
    }
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_backup(mut self, create: bool) -> Self {
        self.backup_policy.create = create;
        self
    }

    pub fn with_verification(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.verify_after_write = true;
        self.verification_algorithm = algorithm;
        self
    }

    pub fn with_max_file_size(mut self, max: u64) -> Self {
        self.max_file_size = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = OperationOptions::default();
        assert!(opts.durability);
        assert_eq!(opts.temp_prefix, ".tmp-");
        assert_eq!(opts.temp_suffix, ".tmp");
        assert_eq!(opts.buffer_size, 64 * 1024);
        assert_eq!(opts.retries, 3);
        assert_eq!(opts.mode, 0o644);
        assert!(opts.create_parents);
        assert!(!opts.overwrite);
    }

    #[test]
    fn builder_methods_compose() {
        let opts = OperationOptions::new()
            .with_overwrite(true)
            .with_backup(true)
            .with_verification(ChecksumAlgorithm::Sha512)
            .with_max_file_size(1024);

        assert!(opts.overwrite);
        assert!(opts.backup_policy.create);
        assert!(opts.verify_after_write);
        assert_eq!(opts.verification_algorithm, ChecksumAlgorithm::Sha512);
        assert_eq!(opts.max_file_size, Some(1024));
    }
}
