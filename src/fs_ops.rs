// src/fs_ops.rs

//! The `Filesystem` capability: a narrow abstraction over the handful of
//! primitives the engine actually needs (open/write/read/chmod/chown/
//! rename/unlink/mkdir/stat/sync), so operations are polymorphic over a
//! real filesystem or an in-memory dry-run double without reaching past
//! the abstraction (spec-9, "not a sprawling trait with every
//! standard-library call").
//!
//! Every method here is synchronous; the async boundary lives one layer up,
//! at the engine's public operations, which dispatch through
//! `tokio::task::spawn_blocking`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Snapshot of a file's metadata, independent of the concrete filesystem.
#[derive(Debug, Clone, Copy)]
pub struct FileStats {
    pub size: u64,
    pub mode: u32,
    pub mtime: SystemTime,
    pub btime: Option<SystemTime>,
}

pub trait Filesystem: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn stat(&self, path: &Path) -> io::Result<FileStats>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    fn unlink(&self, path: &Path) -> io::Result<()>;
    fn mkdir_all(&self, path: &Path) -> io::Result<()>;
    fn rmdir(&self, path: &Path) -> io::Result<()>;
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;
    /// fsync the file itself.
    fn sync_file(&self, path: &Path) -> io::Result<()>;
    /// fsync the containing directory; best-effort, ignored if unsupported.
    fn sync_dir(&self, path: &Path) -> io::Result<()>;
}

/// Real filesystem, backed by `std::fs` and raw syscalls for the parts
/// `std::fs` doesn't expose (directory fsync, EXDEV-aware rename fallback
/// lives one layer up in the Creator/Writer, since it needs both `rename`
/// and `copy` from this trait).
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data)
    }

    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        use std::io::Write;
        let mut file = fs::OpenOptions::new().append(true).create(true).open(path)?;
        file.write_all(data)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn stat(&self, path: &Path) -> io::Result<FileStats> {
        let meta = fs::metadata(path)?;
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode() & 0o777
        };
        #[cfg(not(unix))]
        let mode = if meta.permissions().readonly() { 0o444 } else { 0o644 };

        Ok(FileStats {
            size: meta.len(),
            mode,
            mtime: meta.modified()?,
            btime: meta.created().ok(),
        })
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn mkdir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
        }
        #[cfg(not(unix))]
        {
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_readonly(mode & 0o200 == 0);
            fs::set_permissions(path, perms)
        }
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::ffi::CString;
            let c_path = CString::new(path.as_os_str().as_encoded_bytes())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let ret = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
            if ret == 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        }
        #[cfg(not(unix))]
        {
            let _ = (path, uid, gid);
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "chown is not supported on this platform",
            ))
        }
    }

    fn sync_file(&self, path: &Path) -> io::Result<()> {
        File::open(path)?.sync_all()
    }

    fn sync_dir(&self, path: &Path) -> io::Result<()> {
        match File::open(path) {
            Ok(dir) => {
                // Not every filesystem supports fsync on a directory handle;
                // ignore failures rather than fail the whole operation.
                let _ = dir.sync_all();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// In-memory filesystem used by the dry-run collaborator and by unit tests
/// that exercise rollback logic without touching disk.
#[derive(Default)]
pub struct InMemoryFilesystem {
    inner: parking_lot::Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    files: HashMap<PathBuf, Vec<u8>>,
    modes: HashMap<PathBuf, u32>,
    dirs: std::collections::HashSet<PathBuf>,
}

impl InMemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

impl Filesystem for InMemoryFilesystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let state = self.inner.lock();
        state.files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut state = self.inner.lock();
        state.files.insert(path.to_path_buf(), data.to_vec());
        state.modes.entry(path.to_path_buf()).or_insert(0o644);
        Ok(())
    }

    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut state = self.inner.lock();
        state.files.entry(path.to_path_buf()).or_default().extend_from_slice(data);
        state.modes.entry(path.to_path_buf()).or_insert(0o644);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.inner.lock();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStats> {
        let state = self.inner.lock();
        let data = state.files.get(path).ok_or_else(|| not_found(path))?;
        let mode = *state.modes.get(path).unwrap_or(&0o644);
        Ok(FileStats {
            size: data.len() as u64,
            mode,
            mtime: SystemTime::now(),
            btime: Some(SystemTime::now()),
        })
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.inner.lock();
        let data = state.files.remove(from).ok_or_else(|| not_found(from))?;
        let mode = state.modes.remove(from).unwrap_or(0o644);
        state.files.insert(to.to_path_buf(), data);
        state.modes.insert(to.to_path_buf(), mode);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let mut state = self.inner.lock();
        let data = state.files.get(from).cloned().ok_or_else(|| not_found(from))?;
        let len = data.len() as u64;
        let mode = *state.modes.get(from).unwrap_or(&0o644);
        state.files.insert(to.to_path_buf(), data);
        state.modes.insert(to.to_path_buf(), mode);
        Ok(len)
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        let mut state = self.inner.lock();
        state.modes.remove(path);
        state.files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }

    fn mkdir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.inner.lock();
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.inner.lock();
        if state.dirs.remove(path) {
            Ok(())
        } else {
            Err(not_found(path))
        }
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut state = self.inner.lock();
        if state.files.contains_key(path) {
            state.modes.insert(path.to_path_buf(), mode);
            Ok(())
        } else {
            Err(not_found(path))
        }
    }

    fn chown(&self, _path: &Path, _uid: u32, _gid: u32) -> io::Result<()> {
        Ok(())
    }

    fn sync_file(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn sync_dir(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_write_read_roundtrip() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/a"), b"hello").unwrap();
        assert_eq!(fs.read(Path::new("/a")).unwrap(), b"hello");
    }

    #[test]
    fn in_memory_rename_moves_content() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/a.tmp"), b"content").unwrap();
        fs.rename(Path::new("/a.tmp"), Path::new("/a")).unwrap();

        assert!(!fs.exists(Path::new("/a.tmp")));
        assert_eq!(fs.read(Path::new("/a")).unwrap(), b"content");
    }

    #[test]
    fn in_memory_unlink_missing_file_errors() {
        let fs = InMemoryFilesystem::new();
        assert!(fs.unlink(Path::new("/missing")).is_err());
    }
}
