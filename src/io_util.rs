// src/io_util.rs

//! Small helpers shared by Creator and Writer: chunked staging writes and
//! the retryable/fatal classification from spec-4.8.

use crate::fs_ops::Filesystem;
use std::io;
use std::path::Path;

/// Write `content` to `path`, using a single `write` for small payloads and
/// an initial `write` followed by `append` calls in `buffer_size` chunks
/// for larger ones (spec-4.1 step 4: "If the payload exceeds buffer size,
/// use chunked streaming; else a single write").
pub fn write_staged(fs: &dyn Filesystem, path: &Path, content: &[u8], buffer_size: usize) -> io::Result<()> {
    if content.len() <= buffer_size || buffer_size == 0 {
        return fs.write(path, content);
    }

    let (first, rest) = content.split_at(buffer_size);
    fs.write(path, first)?;
    for chunk in rest.chunks(buffer_size) {
        fs.append(path, chunk)?;
    }
    Ok(())
}

/// Transient failures worth retrying with backoff (spec-4.8): "too many
/// open files", short reads, and EAGAIN-class conditions.
pub fn is_retryable(err: &io::Error) -> bool {
    if matches!(err.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) {
        return true;
    }
    matches!(err.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::EAGAIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::InMemoryFilesystem;

    #[test]
    fn write_staged_single_write_for_small_payload() {
        let fs = InMemoryFilesystem::new();
        write_staged(&fs, Path::new("/a"), b"hello", 64 * 1024).unwrap();
        assert_eq!(fs.read(Path::new("/a")).unwrap(), b"hello");
    }

    #[test]
    fn write_staged_chunks_large_payload() {
        let fs = InMemoryFilesystem::new();
        let content = vec![7u8; 10];
        write_staged(&fs, Path::new("/a"), &content, 3).unwrap();
        assert_eq!(fs.read(Path::new("/a")).unwrap(), content);
    }

    #[test]
    fn retryable_classification() {
        assert!(is_retryable(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_retryable(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
