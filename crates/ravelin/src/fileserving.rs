//! File-serving and file-bucket backends bound during setup.
//!
//! The file server resolves paths inside named mounts; the bucket is a
//! content-addressed store keyed by SHA-256 digest.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileServingError {
    #[error("unknown mount {0:?}")]
    UnknownMount(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("illegal path: {0}")]
    IllegalPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Metadata for one served file.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    pub path: String,
    pub size: u64,
    pub checksum: String,
}

/// Serves file content and metadata out of named mount directories.
pub struct FileServer {
    mounts: HashMap<String, PathBuf>,
}

impl FileServer {
    pub fn new() -> Self {
        Self {
            mounts: HashMap::new(),
        }
    }

    pub fn add_mount(&mut self, name: &str, dir: PathBuf) {
        self.mounts.insert(name.to_string(), dir);
    }

    pub fn content(&self, mount: &str, relative: &str) -> Result<Vec<u8>, FileServingError> {
        let path = self.resolve(mount, relative)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FileServingError::NotFound(relative.to_string()),
            _ => FileServingError::Io(e),
        })
    }

    pub fn metadata(&self, mount: &str, relative: &str) -> Result<FileMetadata, FileServingError> {
        let bytes = self.content(mount, relative)?;
        Ok(FileMetadata {
            path: relative.to_string(),
            size: bytes.len() as u64,
            checksum: format!("sha256:{}", hex::encode(Sha256::digest(&bytes))),
        })
    }

    fn resolve(&self, mount: &str, relative: &str) -> Result<PathBuf, FileServingError> {
        let base = self
            .mounts
            .get(mount)
            .ok_or_else(|| FileServingError::UnknownMount(mount.to_string()))?;

        let candidate = Path::new(relative);
        // Mounts serve only their own subtree.
        if candidate.is_absolute()
            || candidate
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(FileServingError::IllegalPath(relative.to_string()));
        }

        Ok(base.join(candidate))
    }
}

impl Default for FileServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Content-addressed file store: bytes in, digest out.
pub struct FileBucket {
    dir: PathBuf,
}

impl FileBucket {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Store the bytes and return their SHA-256 digest (hex).
    pub fn store(&self, bytes: &[u8]) -> Result<String, io::Error> {
        fs::create_dir_all(&self.dir)?;
        let digest = hex::encode(Sha256::digest(bytes));
        fs::write(self.dir.join(&digest), bytes)?;
        Ok(digest)
    }

    /// Fetch previously stored bytes by digest.
    pub fn retrieve(&self, digest: &str) -> Result<Option<Vec<u8>>, FileServingError> {
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FileServingError::IllegalPath(digest.to_string()));
        }
        match fs::read(self.dir.join(digest)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FileServingError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_with_mount(dir: &Path) -> FileServer {
        let mut server = FileServer::new();
        server.add_mount("files", dir.to_path_buf());
        server
    }

    #[test]
    fn content_reads_from_the_mount() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("motd"), b"hello").unwrap();

        let server = server_with_mount(dir.path());
        assert_eq!(server.content("files", "motd").unwrap(), b"hello");
    }

    #[test]
    fn unknown_mount_and_missing_file_are_distinct_errors() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_mount(dir.path());

        assert!(matches!(
            server.content("modules", "motd"),
            Err(FileServingError::UnknownMount(_))
        ));
        assert!(matches!(
            server.content("files", "ghost"),
            Err(FileServingError::NotFound(_))
        ));
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_mount(dir.path());

        assert!(matches!(
            server.content("files", "../secret"),
            Err(FileServingError::IllegalPath(_))
        ));
        assert!(matches!(
            server.content("files", "/etc/passwd"),
            Err(FileServingError::IllegalPath(_))
        ));
    }

    #[test]
    fn metadata_reports_size_and_checksum() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("motd"), b"hello").unwrap();

        let server = server_with_mount(dir.path());
        let meta = server.metadata("files", "motd").unwrap();
        assert_eq!(meta.size, 5);
        assert!(meta.checksum.starts_with("sha256:"));
    }

    #[test]
    fn bucket_round_trips_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FileBucket::new(dir.path().join("bucket"));

        let digest = bucket.store(b"contents").unwrap();
        assert_eq!(bucket.retrieve(&digest).unwrap().unwrap(), b"contents");
        assert!(bucket
            .retrieve("0000000000000000000000000000000000000000000000000000000000000000")
            .unwrap()
            .is_none());
    }

    #[test]
    fn bucket_rejects_non_hex_keys() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FileBucket::new(dir.path().join("bucket"));
        assert!(bucket.retrieve("../escape").is_err());
    }
}
