// src/atomic.rs

//! The rename-is-the-linearization-point primitive shared by Creator and
//! Writer (spec-5: "the rename step is the linearization point").
//!
//! Grounded on the teacher's `move_file_atomic`: try a same-filesystem
//! rename first; on `EXDEV` (staging and target on different filesystems)
//! fall back to copy + fsync(file) + fsync(parent dir) + unlink(source).
//! The fallback is documented as weaker, not silently treated as
//! equivalent (spec-1 Non-goals: "cross-filesystem atomic rename ...
//! weaker semantics").

use crate::error::{Error, Result};
use crate::fs_ops::Filesystem;
use crate::metrics::EngineMetrics;
use std::path::Path;

pub fn atomic_rename(
    fs: &dyn Filesystem,
    from: &Path,
    to: &Path,
    durability: bool,
    metrics: &EngineMetrics,
) -> Result<()> {
    match fs.rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                "cross-device rename detected, using copy fallback"
            );
            cross_device_move(fs, from, to, durability, metrics)
        }
        Err(source) => Err(Error::RenameFailed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }),
    }
}

fn cross_device_move(
    fs: &dyn Filesystem,
    from: &Path,
    to: &Path,
    durability: bool,
    metrics: &EngineMetrics,
) -> Result<()> {
    fs.copy(from, to).map_err(|source| Error::WriteFailed {
        path: to.to_path_buf(),
        source,
    })?;

    if durability {
        fs.sync_file(to).map_err(|source| Error::SyncFailed {
            path: to.to_path_buf(),
            source,
        })?;
        metrics.record_fsync();

        if let Some(parent) = to.parent() {
            let _ = fs.sync_dir(parent);
        }
    }

    fs.unlink(from).map_err(|source| Error::CleanupFailed {
        path: from.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::InMemoryFilesystem;

    #[test]
    fn rename_moves_content_when_supported() {
        let fs = InMemoryFilesystem::new();
        let metrics = EngineMetrics::new();
        fs.write(Path::new("/a.tmp"), b"content").unwrap();

        atomic_rename(&fs, Path::new("/a.tmp"), Path::new("/a"), true, &metrics).unwrap();

        assert!(!fs.exists(Path::new("/a.tmp")));
        assert_eq!(fs.read(Path::new("/a")).unwrap(), b"content");
    }
}
