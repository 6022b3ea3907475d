use anyhow::Result;
use async_trait::async_trait;
use std::{
    collections::{hash_map::DefaultHasher, BTreeSet},
    hash::{Hash, Hasher},
    sync::Arc,
};

use super::{join_path, BoxedFile, DirEntry, File, FileSystem, FsError, Stats, DEFAULT_DIR_MODE};
use crate::error::Error;

/// One entry of the mount table.
#[derive(Clone)]
struct Mount {
    /// Guest path of the mount point as configured (`""` and `"."` are the root)
    key: String,
    /// Normalized mount point: no leading or trailing `/`, empty for the root
    path: String,
    fs: Arc<dyn FileSystem>,
}

impl Mount {
    fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Strip this mount's prefix from a normalized guest path.
    ///
    /// Only whole path elements match: `animals` covers `animals` and
    /// `animals/x`, never `animalsx`.
    fn relative<'p>(&self, path: &'p str) -> Option<&'p str> {
        if self.is_root() {
            return Some(path);
        }
        if path == self.path {
            return Some(".");
        }
        path.strip_prefix(self.path.as_str())?.strip_prefix('/')
    }
}

/// A single guest-visible namespace assembled from independently mounted stores.
///
/// Every request is routed to the mount whose path is the longest
/// element-wise prefix of the requested path. The mount table is fixed at
/// construction and the lookup order is derived from mount path lengths, so
/// resolution never depends on the order mounts were supplied in.
#[derive(Clone, Default)]
pub struct CompositeFS {
    /// Sorted by descending mount path length, then by configured key
    mounts: Vec<Mount>,
}

/// Lookup failures a mount ancestor hides: the parent store has a file
/// somewhere along the path.
fn is_shadowed(e: &anyhow::Error) -> bool {
    matches!(
        FsError::of(e),
        Some(FsError::NotADirectory | FsError::NotFound)
    )
}

/// Normalize a guest path. Returns `None` for paths that cannot name anything
/// (an empty, `.` or `..` element somewhere inside the path).
fn normalize_guest_path(path: &str) -> Option<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return Some(".".to_string());
    }
    if trimmed
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return None;
    }
    Some(trimmed.to_string())
}

/// Normalize a mount point; `""`, `"."` and `"/"` all become the root (`""`).
///
/// Returns `None` when an element is empty, `.` or `..`: such a mount could
/// never be reached by a normalized guest path.
pub(crate) fn normalize_mount_path(path: &str) -> Option<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return Some(String::new());
    }
    if trimmed
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return None;
    }
    Some(trimmed.to_string())
}

impl CompositeFS {
    /// Create a composite from `(mount path, store)` pairs.
    ///
    /// Fails with [`Error::InvalidMount`] if a mount path has an empty, `.`
    /// or `..` element.
    pub fn new<I, S>(mounts: I) -> crate::error::Result<Self>
    where
        I: IntoIterator<Item = (S, Arc<dyn FileSystem>)>,
        S: Into<String>,
    {
        let mut mounts = mounts
            .into_iter()
            .map(|(key, fs)| {
                let key = key.into();
                match normalize_mount_path(&key) {
                    Some(path) => Ok(Mount { path, key, fs }),
                    None => Err(Error::InvalidMount(key)),
                }
            })
            .collect::<crate::error::Result<Vec<Mount>>>()?;
        // Longest prefix first; equal lengths fall back to the configured key
        mounts.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(Self { mounts })
    }

    /// Guest paths of all mounts, in resolution order.
    pub fn mounts(&self) -> Vec<&str> {
        self.mounts.iter().map(|m| m.key.as_str()).collect()
    }

    /// Map a guest path to the store serving it and the store-relative path.
    ///
    /// Returns `None` when no mount covers the path.
    pub fn resolve(&self, path: &str) -> Option<(Arc<dyn FileSystem>, String)> {
        let normalized = normalize_guest_path(path)?;
        let (mount, relative) = self.resolve_normalized(&normalized)?;
        Some((mount.fs.clone(), relative.to_string()))
    }

    fn resolve_normalized<'p>(&self, path: &'p str) -> Option<(&Mount, &'p str)> {
        let found = self.mounts.iter().find_map(|mount| {
            if path == "." && !mount.is_root() {
                return None;
            }
            mount.relative(path).map(|rel| (mount, rel))
        });
        match &found {
            Some((mount, rel)) => {
                tracing::trace!("CompositeFS::resolve {} -> mount {:?}, {}", path, mount.key, rel)
            }
            None => tracing::trace!("CompositeFS::resolve {} -> no mount", path),
        }
        found
    }

    /// Names of the entries mount points contribute directly under the guest
    /// directory `dir`: the mount point itself, or its first element when the
    /// mount sits deeper.
    fn child_mounts(&self, dir: &str) -> BTreeSet<&str> {
        self.mounts
            .iter()
            .filter(|m| !m.is_root())
            .filter_map(|m| {
                let rest = if dir == "." {
                    m.path.as_str()
                } else {
                    m.path.strip_prefix(dir)?.strip_prefix('/')?
                };
                rest.split('/').next()
            })
            .collect()
    }

    /// True when `dir` has to exist because some mount point lies beneath it.
    fn is_mount_ancestor(&self, dir: &str) -> bool {
        !self.child_mounts(dir).is_empty()
    }

    /// Stats for a mount ancestor. The store's own entry is kept only if it is
    /// a directory; a file or a broken path there is shadowed by the virtual
    /// directory the mounts below require.
    async fn ancestor_stats(&self, dir: &str) -> Result<Option<Stats>> {
        if !self.is_mount_ancestor(dir) {
            return Ok(None);
        }
        if let Some((mount, rel)) = self.resolve_normalized(dir) {
            match mount.fs.stat(rel).await {
                Ok(Some(stats)) if stats.is_directory() => return Ok(Some(stats)),
                Ok(_) => {}
                Err(e) if is_shadowed(&e) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::trace!("CompositeFS: {} is a virtual directory", dir);
        Ok(Some(Self::virtual_dir_stats(dir)))
    }

    fn virtual_dir_stats(dir: &str) -> Stats {
        let mut hasher = DefaultHasher::new();
        dir.hash(&mut hasher);
        Stats {
            ino: (hasher.finish() >> 1) as i64,
            mode: DEFAULT_DIR_MODE,
            nlink: 2,
            size: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
        }
    }
}

#[async_trait]
impl FileSystem for CompositeFS {
    async fn stat(&self, path: &str) -> Result<Option<Stats>> {
        let Some(normalized) = normalize_guest_path(path) else {
            return Ok(None);
        };
        if let Some(stats) = self.ancestor_stats(&normalized).await? {
            return Ok(Some(stats));
        }
        match self.resolve_normalized(&normalized) {
            Some((mount, rel)) => mount.fs.stat(rel).await,
            None => Ok(None),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(normalized) = normalize_guest_path(path) else {
            return Ok(None);
        };
        if self.is_mount_ancestor(&normalized) {
            return Err(FsError::IsADirectory.into());
        }
        match self.resolve_normalized(&normalized) {
            Some((mount, rel)) => mount.fs.read_file(rel).await,
            None => Ok(None),
        }
    }

    async fn pread(&self, path: &str, offset: u64, size: u64) -> Result<Option<Vec<u8>>> {
        let Some(normalized) = normalize_guest_path(path) else {
            return Ok(None);
        };
        if self.is_mount_ancestor(&normalized) {
            return Err(FsError::IsADirectory.into());
        }
        match self.resolve_normalized(&normalized) {
            Some((mount, rel)) => mount.fs.pread(rel, offset, size).await,
            None => Ok(None),
        }
    }

    async fn readdir(&self, path: &str) -> Result<Option<Vec<String>>> {
        let Some(normalized) = normalize_guest_path(path) else {
            return Ok(None);
        };
        let children = self.child_mounts(&normalized);
        let listed = match self.resolve_normalized(&normalized) {
            Some((mount, rel)) => match mount.fs.readdir(rel).await {
                Err(e) if !children.is_empty() && is_shadowed(&e) => None,
                result => result?,
            },
            None => None,
        };
        let mut entries = match listed {
            Some(entries) => entries,
            None if !children.is_empty() => Vec::new(),
            None => return Ok(None),
        };
        for name in children {
            if !entries.iter().any(|e| e == name) {
                entries.push(name.to_string());
            }
        }
        entries.sort();
        Ok(Some(entries))
    }

    async fn readdir_plus(&self, path: &str) -> Result<Option<Vec<DirEntry>>> {
        let Some(normalized) = normalize_guest_path(path) else {
            return Ok(None);
        };
        let children = self.child_mounts(&normalized);
        let listed = match self.resolve_normalized(&normalized) {
            Some((mount, rel)) => match mount.fs.readdir_plus(rel).await {
                Err(e) if !children.is_empty() && is_shadowed(&e) => None,
                result => result?,
            },
            None => None,
        };
        let mut entries = match listed {
            Some(entries) => entries,
            None if !children.is_empty() => Vec::new(),
            None => return Ok(None),
        };
        for name in children {
            let child = join_path(&normalized, name);
            // A mount point shadows whatever the parent store has under that name
            if let Some(stats) = self.stat(&child).await? {
                entries.retain(|e| e.name != name);
                entries.push(DirEntry {
                    name: name.to_string(),
                    stats,
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Some(entries))
    }

    async fn open(&self, path: &str) -> Result<BoxedFile> {
        let normalized = normalize_guest_path(path).ok_or(FsError::NotFound)?;
        if let Some(stats) = self.ancestor_stats(&normalized).await? {
            return Ok(Arc::new(VirtualDir { stats }));
        }
        match self.resolve_normalized(&normalized) {
            Some((mount, rel)) => mount.fs.open(rel).await,
            None => Err(FsError::NotFound.into()),
        }
    }
}

/// Handle for a directory that mount points lie beneath.
struct VirtualDir {
    stats: Stats,
}

#[async_trait]
impl File for VirtualDir {
    async fn pread(&self, _offset: u64, _size: u64) -> Result<Vec<u8>> {
        Err(FsError::IsADirectory.into())
    }

    async fn fstat(&self) -> Result<Stats> {
        Ok(self.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{check_conformance, MemFS};

    fn testdata() -> MemFS {
        MemFS::new()
            .with_file("bear.txt", "pooh\n")
            .with_file("fish/clownfish.txt", "nemo\n")
            .with_file("mammals/whale.txt", "moby dick\n")
            .with_file("mammals/primates/ape.txt", "king kong\n")
    }

    fn sub(path: &str) -> Arc<dyn FileSystem> {
        let fs = testdata();
        if path.is_empty() {
            Arc::new(fs)
        } else {
            Arc::new(fs.sub(path).unwrap())
        }
    }

    async fn read_trimmed(fs: &CompositeFS, path: &str) -> Result<Option<String>> {
        let content = fs.read_file(path).await?;
        Ok(content.map(|c| String::from_utf8_lossy(&c).trim().to_string()))
    }

    #[tokio::test]
    async fn test_composite_read_table() -> Result<()> {
        struct Case {
            name: &'static str,
            mounts: Vec<(&'static str, &'static str)>,
            path: &'static str,
            content: Option<&'static str>,
        }
        let cases = vec![
            Case {
                name: "empty",
                mounts: vec![],
                path: "bear.txt",
                content: None,
            },
            Case {
                name: "single mount to root",
                mounts: vec![("", "")],
                path: "bear.txt",
                content: Some("pooh"),
            },
            Case {
                name: "single mount to root",
                mounts: vec![("", "")],
                path: "fish/clownfish.txt",
                content: Some("nemo"),
            },
            Case {
                name: "single mount to root",
                mounts: vec![("", "")],
                path: "mammals/primates/ape.txt",
                content: Some("king kong"),
            },
            Case {
                name: "single mount to path",
                mounts: vec![("mammals", "")],
                path: "mammals/bear.txt",
                content: Some("pooh"),
            },
            Case {
                name: "single mount to path",
                mounts: vec![("mammals", "")],
                path: "mammals/whale.txt",
                content: None,
            },
            Case {
                name: "single mount to path",
                mounts: vec![("mammals", "")],
                path: "bear.txt",
                content: None,
            },
            Case {
                name: "non-overlapping mounts",
                mounts: vec![("fish", "fish"), ("mammals", "mammals")],
                path: "fish/clownfish.txt",
                content: Some("nemo"),
            },
            Case {
                name: "non-overlapping mounts",
                mounts: vec![("fish", "fish"), ("mammals", "mammals")],
                path: "mammals/whale.txt",
                content: Some("moby dick"),
            },
            Case {
                name: "non-overlapping mounts",
                mounts: vec![("fish", "fish"), ("mammals", "mammals")],
                path: "mammals/primates/ape.txt",
                content: Some("king kong"),
            },
            Case {
                name: "non-overlapping mounts",
                mounts: vec![("fish", "fish"), ("mammals", "mammals")],
                path: "bear.txt",
                content: None,
            },
        ];

        for case in cases {
            let fs = CompositeFS::new(case.mounts.iter().map(|(m, s)| (*m, sub(s))))?;
            let got = read_trimmed(&fs, case.path).await?;
            assert_eq!(
                got.as_deref(),
                case.content,
                "{} - {}",
                case.name,
                case.path
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_composite_overlapping_mounts_any_order() -> Result<()> {
        let deep_first = vec![("animals/fish", "fish"), ("animals", "mammals")];
        let shallow_first = vec![("animals", "mammals"), ("animals/fish", "fish")];

        for order in [deep_first, shallow_first] {
            let fs = CompositeFS::new(order.iter().map(|(m, s)| (*m, sub(s))))?;
            assert_eq!(
                read_trimmed(&fs, "animals/fish/clownfish.txt").await?.as_deref(),
                Some("nemo")
            );
            assert_eq!(
                read_trimmed(&fs, "animals/whale.txt").await?.as_deref(),
                Some("moby dick")
            );
            assert_eq!(read_trimmed(&fs, "animals/bear.txt").await?, None);
            assert_eq!(fs.mounts(), vec!["animals/fish", "animals"]);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_composite_resolve_relative_paths() -> Result<()> {
        let fs = CompositeFS::new([("animals", sub("mammals")), ("", sub(""))])?;

        let (_, rel) = fs.resolve("animals/primates/ape.txt").unwrap();
        assert_eq!(rel, "primates/ape.txt");
        let (_, rel) = fs.resolve("animals").unwrap();
        assert_eq!(rel, ".");
        let (_, rel) = fs.resolve("/animals/").unwrap();
        assert_eq!(rel, ".");
        // Prefix must end on an element boundary
        let (_, rel) = fs.resolve("animalsx/bear.txt").unwrap();
        assert_eq!(rel, "animalsx/bear.txt");
        let (_, rel) = fs.resolve(".").unwrap();
        assert_eq!(rel, ".");

        assert!(fs.resolve("animals/../bear.txt").is_none());
        assert!(CompositeFS::default().resolve("bear.txt").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_composite_root_under_both_spellings() -> Result<()> {
        let store = sub("");
        let via_empty = CompositeFS::new([("", store.clone())])?;
        let via_dot = CompositeFS::new([(".", store.clone())])?;
        let both = CompositeFS::new([(".", store.clone()), ("", store)])?;
        assert_eq!(both.mounts(), vec!["", "."]);

        let expected = Some(b"pooh\n".to_vec());
        assert_eq!(via_empty.read_file("bear.txt").await?, expected);
        assert_eq!(via_dot.read_file("bear.txt").await?, expected);
        assert_eq!(both.read_file("bear.txt").await?, expected);
        assert_eq!(
            via_empty.readdir(".").await?,
            via_dot.readdir(".").await?
        );

        // "./x" is not a valid guest path under either spelling
        assert!(both.read_file("./bear.txt").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_composite_missing_is_not_found() -> Result<()> {
        let fs = CompositeFS::new([("mammals", sub("mammals"))])?;

        let err = fs.open("bear.txt").await.err().unwrap();
        assert_eq!(FsError::of(&err), Some(FsError::NotFound));
        let err = fs.open("mammals/bear.txt").await.err().unwrap();
        assert_eq!(FsError::of(&err), Some(FsError::NotFound));

        assert!(fs.stat("bear.txt").await?.is_none());
        assert!(fs.readdir("fish").await?.is_none());
        assert!(CompositeFS::default().readdir(".").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_composite_reopen_is_idempotent() -> Result<()> {
        let fs = CompositeFS::new([("", sub(""))])?;
        let first = fs.open("fish/clownfish.txt").await?.pread(0, 64).await?;
        let second = fs.open("fish/clownfish.txt").await?.pread(0, 64).await?;
        assert_eq!(first, second);
        assert_eq!(fs.read_file("fish/clownfish.txt").await?.unwrap(), first);
        Ok(())
    }

    #[tokio::test]
    async fn test_composite_listing_includes_mount_points() -> Result<()> {
        let fs = CompositeFS::new([
            ("", sub("")),
            ("mammals/fish", sub("fish")),
            ("reptiles", Arc::new(MemFS::new()) as Arc<dyn FileSystem>),
        ])?;

        let root = fs.readdir(".").await?.unwrap();
        assert_eq!(root, vec!["bear.txt", "fish", "mammals", "reptiles"]);

        let mammals = fs.readdir("mammals").await?.unwrap();
        assert_eq!(mammals, vec!["fish", "primates", "whale.txt"]);

        let plus = fs.readdir_plus("mammals").await?.unwrap();
        let fish = plus.iter().find(|e| e.name == "fish").unwrap();
        assert!(fish.stats.is_directory());
        assert_eq!(
            fs.read_file("mammals/fish/clownfish.txt").await?.unwrap(),
            b"nemo\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_composite_virtual_parent_directories() -> Result<()> {
        let fs = CompositeFS::new([("zoo/animals/fish", sub("fish"))])?;

        assert_eq!(fs.readdir(".").await?.unwrap(), vec!["zoo"]);
        assert_eq!(fs.readdir("zoo").await?.unwrap(), vec!["animals"]);
        assert!(fs.stat("zoo/animals").await?.unwrap().is_directory());
        assert!(fs.open("zoo").await?.fstat().await?.is_directory());

        let err = fs.read_file("zoo").await.err().unwrap();
        assert_eq!(FsError::of(&err), Some(FsError::IsADirectory));
        assert!(fs.stat("zoo/bear.txt").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_composite_conformance() -> Result<()> {
        // Lookups use both the bare and the "."-rooted spelling
        let store = sub("");
        let fs = CompositeFS::new([(".", store.clone()), ("", store)])?;
        check_conformance(&fs, &["bear.txt"]).await?;

        let nested = CompositeFS::new([("", sub("")), ("animals/fish", sub("fish"))])?;
        check_conformance(&nested, &["bear.txt", "animals/fish/clownfish.txt"]).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_composite_mount_below_parent_file() -> Result<()> {
        let parent: Arc<dyn FileSystem> = Arc::new(MemFS::new().with_file("a", "file"));
        let below: Arc<dyn FileSystem> = Arc::new(MemFS::new().with_file("x.txt", "x"));
        let fs = CompositeFS::new([("", parent), ("a/b", below)])?;

        assert!(fs.stat("a").await?.unwrap().is_directory());
        assert!(fs.open("a").await?.fstat().await?.is_directory());
        assert_eq!(fs.readdir("a").await?.unwrap(), vec!["b"]);
        let root = fs.readdir_plus(".").await?.unwrap();
        assert!(root.iter().find(|e| e.name == "a").unwrap().stats.is_directory());

        let err = fs.read_file("a").await.err().unwrap();
        assert_eq!(FsError::of(&err), Some(FsError::IsADirectory));
        let err = fs.pread("a", 0, 4).await.err().unwrap();
        assert_eq!(FsError::of(&err), Some(FsError::IsADirectory));

        assert_eq!(fs.read_file("a/b/x.txt").await?.unwrap(), b"x");
        check_conformance(&fs, &["a", "a/b", "a/b/x.txt"]).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_composite_mount_below_deeper_parent_file() -> Result<()> {
        // "a/b" would be looked up through the file "a" in the parent store
        let parent: Arc<dyn FileSystem> = Arc::new(MemFS::new().with_file("a", "file"));
        let below: Arc<dyn FileSystem> = Arc::new(MemFS::new().with_file("x.txt", "x"));
        let fs = CompositeFS::new([("", parent), ("a/b/c", below)])?;

        assert!(fs.stat("a/b").await?.unwrap().is_directory());
        assert_eq!(fs.readdir("a/b").await?.unwrap(), vec!["c"]);
        check_conformance(&fs, &["a/b/c/x.txt"]).await?;
        Ok(())
    }

    #[test]
    fn test_composite_rejects_unreachable_mount_paths() {
        for bad in ["a//b", "a/./b", "a/../b", ".."] {
            let result = CompositeFS::new([(bad, Arc::new(MemFS::new()) as Arc<dyn FileSystem>)]);
            assert!(
                matches!(result.err(), Some(Error::InvalidMount(ref p)) if p == bad),
                "{bad}"
            );
        }
        assert!(CompositeFS::new([("/a/", Arc::new(MemFS::new()) as Arc<dyn FileSystem>)]).is_ok());
    }
}
