use anyhow::Result;
use async_trait::async_trait;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::{components, BoxedFile, DirEntry, File, FileSystem, FsError, Stats};

/// A read-only filesystem backed by a host directory (passthrough)
#[derive(Clone)]
pub struct HostFS {
    root: PathBuf,
}

impl HostFS {
    /// Create a new HostFS rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            anyhow::bail!("Root directory does not exist: {}", root.display());
        }
        if !root.is_dir() {
            anyhow::bail!("Root path is not a directory: {}", root.display());
        }
        Ok(Self { root })
    }

    /// Get the root directory
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Resolve a virtual path to a host path, refusing `..` elements.
    ///
    /// Symlinks inside the root are followed by the host, including ones
    /// whose targets lie outside it.
    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        let parts = components(path).ok_or(FsError::InvalidPath)?;
        let mut full = self.root.clone();
        full.extend(parts);
        Ok(full)
    }

    /// Convert std::fs::Metadata to Stats
    fn metadata_to_stats(metadata: &std::fs::Metadata) -> Stats {
        Stats {
            ino: metadata.ino() as i64,
            mode: metadata.mode(),
            nlink: metadata.nlink() as u32,
            size: metadata.size() as i64,
            atime: metadata.atime(),
            mtime: metadata.mtime(),
            ctime: metadata.ctime(),
        }
    }
}

#[async_trait]
impl FileSystem for HostFS {
    async fn stat(&self, path: &str) -> Result<Option<Stats>> {
        let full_path = self.resolve_path(path)?;
        match fs::metadata(&full_path).await {
            Ok(metadata) => Ok(Some(Self::metadata_to_stats(&metadata))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.raw_os_error() == Some(libc::ENOTDIR) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full_path = self.resolve_path(path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.raw_os_error() == Some(libc::ENOTDIR) => Ok(None),
            Err(e) if e.raw_os_error() == Some(libc::EISDIR) => Err(FsError::IsADirectory.into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn pread(&self, path: &str, offset: u64, size: u64) -> Result<Option<Vec<u8>>> {
        let full_path = self.resolve_path(path)?;
        let mut file = match fs::File::open(&full_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.raw_os_error() == Some(libc::ENOTDIR) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if file.metadata().await?.is_dir() {
            return Err(FsError::IsADirectory.into());
        }

        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = Vec::new();
        (&mut file).take(size).read_to_end(&mut buf).await?;
        Ok(Some(buf))
    }

    async fn readdir(&self, path: &str) -> Result<Option<Vec<String>>> {
        let full_path = self.resolve_path(path)?;
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&full_path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            // Not a directory - return None (path exists but has no children)
            Err(e) if e.raw_os_error() == Some(libc::ENOTDIR) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_string());
            }
        }
        entries.sort();
        Ok(Some(entries))
    }

    async fn readdir_plus(&self, path: &str) -> Result<Option<Vec<DirEntry>>> {
        let full_path = self.resolve_path(path)?;
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&full_path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.raw_os_error() == Some(libc::ENOTDIR) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                // Follow symlinks so entries agree with stat()
                let entry_path = full_path.join(name);
                if let Ok(metadata) = fs::metadata(&entry_path).await {
                    entries.push(DirEntry {
                        name: name.to_string(),
                        stats: Self::metadata_to_stats(&metadata),
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Some(entries))
    }

    async fn open(&self, path: &str) -> Result<BoxedFile> {
        let full_path = self.resolve_path(path)?;
        let file = match fs::File::open(&full_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FsError::NotFound.into())
            }
            Err(e) if e.raw_os_error() == Some(libc::ENOTDIR) => {
                return Err(FsError::NotFound.into())
            }
            Err(e) => return Err(e.into()),
        };
        let stats = Self::metadata_to_stats(&file.metadata().await?);
        tracing::trace!("HostFS::open {} -> ino {}", path, stats.ino);
        Ok(Arc::new(HostFile {
            file: Mutex::new(file),
            stats,
        }))
    }
}

/// An open host file. Reads are positioned, so the shared cursor is serialized.
struct HostFile {
    file: Mutex<fs::File>,
    stats: Stats,
}

#[async_trait]
impl File for HostFile {
    async fn pread(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        if self.stats.is_directory() {
            return Err(FsError::IsADirectory.into());
        }
        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = Vec::new();
        (&mut *file).take(size).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn fstat(&self) -> Result<Stats> {
        let metadata = self.file.lock().await.metadata().await?;
        Ok(HostFS::metadata_to_stats(&metadata))
    }
}
