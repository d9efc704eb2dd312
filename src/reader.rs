// src/reader.rs

//! Read-side collaborator. Shares no mutable state with Creator/Writer;
//! reads do not participate in rollback or temp-file tracking.

use crate::checksum::{hash_bytes, Checksum, ChecksumAlgorithm};
use crate::error::{Error, Result};
use crate::fs_ops::{FileStats, Filesystem};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ReadResult {
    pub content: Vec<u8>,
    pub stats: FileStats,
    pub checksum: Option<Checksum>,
}

pub struct Reader<'a> {
    pub fs: &'a dyn Filesystem,
}

impl<'a> Reader<'a> {
    pub fn new(fs: &'a dyn Filesystem) -> Self {
        Self { fs }
    }

    pub fn read(&self, path: &Path) -> Result<ReadResult> {
        if !self.fs.exists(path) {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        let content = self.fs.read(path).map_err(Error::Io)?;
        let stats = self.fs.stat(path).map_err(Error::Io)?;

        Ok(ReadResult {
            content,
            stats,
            checksum: None,
        })
    }

    pub fn read_with_checksum(&self, path: &Path, algorithm: ChecksumAlgorithm) -> Result<ReadResult> {
        let mut result = self.read(path)?;
        result.checksum = Some(hash_bytes(algorithm, &result.content));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::InMemoryFilesystem;

    #[test]
    fn read_returns_content_and_stats() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/a"), b"hello").unwrap();
        let reader = Reader::new(&fs);

        let result = reader.read(Path::new("/a")).unwrap();
        assert_eq!(result.content, b"hello");
        assert_eq!(result.stats.size, 5);
        assert!(result.checksum.is_none());
    }

    #[test]
    fn read_missing_file_errors() {
        let fs = InMemoryFilesystem::new();
        let reader = Reader::new(&fs);

        let err = reader.read(Path::new("/missing")).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::FileNotFound);
    }

    #[test]
    fn read_with_checksum_computes_digest() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("/a"), b"Hello, World!").unwrap();
        let reader = Reader::new(&fs);

        let result = reader.read_with_checksum(Path::new("/a"), ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(
            result.checksum.unwrap().as_str(),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }
}
