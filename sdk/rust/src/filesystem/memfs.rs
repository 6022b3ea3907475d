use anyhow::Result;
use async_trait::async_trait;
use std::{
    collections::{hash_map::DefaultHasher, BTreeMap},
    hash::{Hash, Hasher},
    sync::Arc,
};

use super::{
    components, join_path, BoxedFile, DirEntry, File, FileSystem, FsError, Stats,
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE,
};

/// A node of the in-memory tree, keyed by path component.
#[derive(Debug, Clone)]
enum Node {
    File(Arc<[u8]>),
    Dir(BTreeMap<String, Node>),
}

impl Default for Node {
    fn default() -> Self {
        Node::Dir(BTreeMap::new())
    }
}

/// An immutable in-memory filesystem.
///
/// Built once through the `with_*` methods and then shared; clones are cheap
/// and see the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemFS {
    root: Arc<Node>,
}

impl MemFS {
    /// Create an empty filesystem containing only the root directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, creating missing parent directories.
    ///
    /// A file standing where a parent directory is needed is replaced by that
    /// directory.
    pub fn with_file(mut self, path: &str, data: impl AsRef<[u8]>) -> Self {
        let Some(parts) = components(path) else {
            return self;
        };
        let Some((name, parents)) = parts.split_last() else {
            return self;
        };
        let dir = Self::ensure_dir(Arc::make_mut(&mut self.root), parents);
        dir.insert(name.to_string(), Node::File(Arc::from(data.as_ref())));
        self
    }

    /// Add an (empty) directory, creating missing parents
    pub fn with_dir(mut self, path: &str) -> Self {
        if let Some(parts) = components(path) {
            Self::ensure_dir(Arc::make_mut(&mut self.root), &parts);
        }
        self
    }

    /// Return a filesystem rooted at `dir`, sharing no state with `self`.
    pub fn sub(&self, dir: &str) -> Result<MemFS> {
        match self.lookup(dir)? {
            Some(node @ Node::Dir(_)) => Ok(MemFS {
                root: Arc::new(node.clone()),
            }),
            Some(Node::File(_)) => Err(FsError::NotADirectory.into()),
            None => Err(FsError::NotFound.into()),
        }
    }

    fn ensure_dir<'a>(mut node: &'a mut Node, parts: &[&str]) -> &'a mut BTreeMap<String, Node> {
        for part in parts {
            if !matches!(node, Node::Dir(_)) {
                *node = Node::default();
            }
            let Node::Dir(children) = node else {
                unreachable!("node was just made a directory");
            };
            let child = children.entry(part.to_string()).or_default();
            if let Node::File(_) = child {
                *child = Node::default();
            }
            node = child;
        }
        if !matches!(node, Node::Dir(_)) {
            *node = Node::default();
        }
        match node {
            Node::Dir(children) => children,
            Node::File(_) => unreachable!("node was just made a directory"),
        }
    }

    fn lookup(&self, path: &str) -> Result<Option<&Node>> {
        let parts = components(path).ok_or(FsError::InvalidPath)?;
        let mut node = &*self.root;
        for part in parts {
            match node {
                Node::Dir(children) => match children.get(part) {
                    Some(child) => node = child,
                    None => return Ok(None),
                },
                Node::File(_) => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    fn node_stats(node: &Node, path: &str) -> Stats {
        // Synthetic inode from the normalized path
        let mut hasher = DefaultHasher::new();
        components(path).unwrap_or_default().join("/").hash(&mut hasher);
        let ino = (hasher.finish() >> 1) as i64;

        match node {
            Node::File(data) => Stats {
                ino,
                mode: DEFAULT_FILE_MODE,
                nlink: 1,
                size: data.len() as i64,
                atime: 0,
                mtime: 0,
                ctime: 0,
            },
            Node::Dir(children) => Stats {
                ino,
                mode: DEFAULT_DIR_MODE,
                nlink: 2,
                size: children.len() as i64,
                atime: 0,
                mtime: 0,
                ctime: 0,
            },
        }
    }
}

fn slice_at(data: &[u8], offset: u64, size: u64) -> Vec<u8> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
    let len = usize::try_from(size).unwrap_or(usize::MAX);
    let end = start.saturating_add(len).min(data.len());
    data[start..end].to_vec()
}

#[async_trait]
impl FileSystem for MemFS {
    async fn stat(&self, path: &str) -> Result<Option<Stats>> {
        Ok(self
            .lookup(path)?
            .map(|node| Self::node_stats(node, path)))
    }

    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.lookup(path)? {
            Some(Node::File(data)) => Ok(Some(data.to_vec())),
            Some(Node::Dir(_)) => Err(FsError::IsADirectory.into()),
            None => Ok(None),
        }
    }

    async fn pread(&self, path: &str, offset: u64, size: u64) -> Result<Option<Vec<u8>>> {
        match self.lookup(path)? {
            Some(Node::File(data)) => Ok(Some(slice_at(data, offset, size))),
            Some(Node::Dir(_)) => Err(FsError::IsADirectory.into()),
            None => Ok(None),
        }
    }

    async fn readdir(&self, path: &str) -> Result<Option<Vec<String>>> {
        match self.lookup(path)? {
            // BTreeMap keys are already sorted
            Some(Node::Dir(children)) => Ok(Some(children.keys().cloned().collect())),
            _ => Ok(None),
        }
    }

    async fn readdir_plus(&self, path: &str) -> Result<Option<Vec<DirEntry>>> {
        match self.lookup(path)? {
            Some(Node::Dir(children)) => Ok(Some(
                children
                    .iter()
                    .map(|(name, child)| DirEntry {
                        name: name.clone(),
                        stats: Self::node_stats(child, &join_path(path, name)),
                    })
                    .collect(),
            )),
            _ => Ok(None),
        }
    }

    async fn open(&self, path: &str) -> Result<BoxedFile> {
        let node = self.lookup(path)?.ok_or(FsError::NotFound)?;
        let stats = Self::node_stats(node, path);
        let data = match node {
            Node::File(data) => Some(data.clone()),
            Node::Dir(_) => None,
        };
        Ok(Arc::new(MemFile { data, stats }))
    }
}

/// An open handle into a [`MemFS`]; keeps its content alive after the tree is dropped.
struct MemFile {
    /// `None` for directories
    data: Option<Arc<[u8]>>,
    stats: Stats,
}

#[async_trait]
impl File for MemFile {
    async fn pread(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        match &self.data {
            Some(data) => Ok(slice_at(data, offset, size)),
            None => Err(FsError::IsADirectory.into()),
        }
    }

    async fn fstat(&self) -> Result<Stats> {
        Ok(self.stats.clone())
    }
}
