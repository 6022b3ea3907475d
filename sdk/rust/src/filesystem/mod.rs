pub mod compositefs;
pub mod conformance;
#[cfg(unix)]
pub mod hostfs;
pub mod memfs;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// Re-export implementations
pub use compositefs::CompositeFS;
pub use conformance::check_conformance;
#[cfg(unix)]
pub use hostfs::HostFS;
pub use memfs::MemFS;

/// Filesystem-specific errors with errno semantics
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("Path does not exist")]
    NotFound,

    #[error("Not a directory")]
    NotADirectory,

    #[error("Is a directory")]
    IsADirectory,

    #[error("Invalid path")]
    InvalidPath,
}

impl FsError {
    /// Returns the `FsError` carried by an `anyhow::Error`, if any.
    pub fn of(err: &anyhow::Error) -> Option<FsError> {
        err.downcast_ref::<FsError>().copied()
    }
}

// File types for mode field
pub const S_IFMT: u32 = 0o170000; // File type mask
pub const S_IFREG: u32 = 0o100000; // Regular file
pub const S_IFDIR: u32 = 0o040000; // Directory

// Default permissions for synthesized entries (read-only stores)
pub const DEFAULT_FILE_MODE: u32 = S_IFREG | 0o444;
pub const DEFAULT_DIR_MODE: u32 = S_IFDIR | 0o555;

/// File statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub ino: i64,
    pub mode: u32,
    pub nlink: u32,
    pub size: i64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// Directory entry with full statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (without path)
    pub name: String,
    /// Full statistics for this entry
    pub stats: Stats,
}

impl Stats {
    pub fn is_file(&self) -> bool {
        (self.mode & S_IFMT) == S_IFREG
    }

    pub fn is_directory(&self) -> bool {
        (self.mode & S_IFMT) == S_IFDIR
    }
}

/// An open file handle.
///
/// Handles are read-only snapshots of what the path named when it was opened.
#[async_trait]
pub trait File: Send + Sync {
    /// Read up to `size` bytes starting at `offset`. Short reads happen at EOF.
    async fn pread(&self, offset: u64, size: u64) -> Result<Vec<u8>>;

    /// Get statistics of the open file
    async fn fstat(&self) -> Result<Stats>;
}

pub type BoxedFile = Arc<dyn File>;

/// A read-only, hierarchical backing store.
///
/// Paths are slash-separated and relative to the store root. `""`, `"."`
/// and `"/"` all name the root; a leading `/` is ignored.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Get file statistics
    ///
    /// Returns `Ok(None)` if the path does not exist.
    async fn stat(&self, path: &str) -> Result<Option<Stats>>;

    /// Read entire file contents
    ///
    /// Returns `Ok(None)` if the file does not exist.
    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Read from a file at a given offset (like POSIX pread)
    ///
    /// Returns `Ok(None)` if the file does not exist.
    async fn pread(&self, path: &str, offset: u64, size: u64) -> Result<Option<Vec<u8>>>;

    /// List directory contents, sorted by name
    ///
    /// Returns `Ok(None)` if the directory does not exist.
    async fn readdir(&self, path: &str) -> Result<Option<Vec<String>>>;

    /// List directory contents with full statistics for each entry
    ///
    /// Returns `Ok(None)` if the directory does not exist.
    async fn readdir_plus(&self, path: &str) -> Result<Option<Vec<DirEntry>>>;

    /// Open a file or directory.
    ///
    /// Fails with [`FsError::NotFound`] if the path does not exist.
    async fn open(&self, path: &str) -> Result<BoxedFile>;
}

/// Split a store-relative path into its non-empty components.
///
/// Returns `None` if any component is `..`, which no store may follow.
pub(crate) fn components(path: &str) -> Option<Vec<&str>> {
    let mut out = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            _ => out.push(part),
        }
    }
    Some(out)
}

/// Join a directory path and an entry name the way stores report children.
pub(crate) fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components() {
        assert_eq!(components("").unwrap(), Vec::<&str>::new());
        assert_eq!(components(".").unwrap(), Vec::<&str>::new());
        assert_eq!(components("/a//b/./c/").unwrap(), vec!["a", "b", "c"]);
        assert!(components("a/../b").is_none());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(".", "bear.txt"), "bear.txt");
        assert_eq!(join_path("", "fish"), "fish");
        assert_eq!(join_path("/mammals/", "whale.txt"), "mammals/whale.txt");
    }

    #[test]
    fn test_fs_error_of() {
        let err: anyhow::Error = FsError::NotFound.into();
        assert_eq!(FsError::of(&err), Some(FsError::NotFound));
        let other = anyhow::anyhow!("boom");
        assert_eq!(FsError::of(&other), None);
    }
}
