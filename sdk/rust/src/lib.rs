pub mod error;
pub mod filesystem;

use error::{Error, Result};
use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

// Re-export filesystem types
#[cfg(unix)]
pub use filesystem::HostFS;
pub use filesystem::{
    check_conformance, BoxedFile, CompositeFS, DirEntry, File, FileSystem, FsError, MemFS, Stats,
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, S_IFDIR, S_IFMT, S_IFREG,
};

/// One `<host-dir>[:<guest-path>]` mount option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Directory on the host serving the mount
    pub host: PathBuf,
    /// Normalized guest mount point, empty for the root
    pub guest: String,
}

impl MountSpec {
    /// Parse a mount option.
    ///
    /// The guest path follows the last `:` and defaults to the root. Leading
    /// and trailing `/` are ignored and a lone `.` also names the root.
    pub fn parse(value: &str) -> Result<Self> {
        let (host, guest) = match value.rsplit_once(':') {
            Some((host, guest)) => (host, guest),
            None => (value, ""),
        };
        if host.is_empty() {
            return Err(Error::InvalidMount(value.to_string()));
        }
        let guest = filesystem::compositefs::normalize_mount_path(guest)
            .ok_or_else(|| Error::InvalidMount(value.to_string()))?;
        Ok(Self {
            host: PathBuf::from(host),
            guest,
        })
    }
}

impl std::str::FromStr for MountSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Configuration for the guest-visible namespace
#[derive(Clone, Default)]
pub struct FsOptions {
    mounts: Vec<MountSpec>,
    stores: Vec<(String, Arc<dyn FileSystem>)>,
}

impl FsOptions {
    /// Create options with no mounts; the resulting namespace is empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a host directory
    pub fn with_mount(mut self, spec: MountSpec) -> Self {
        self.mounts.push(spec);
        self
    }

    /// Mount an already constructed store at `guest`
    pub fn with_store(mut self, guest: impl Into<String>, fs: Arc<dyn FileSystem>) -> Self {
        self.stores.push((guest.into(), fs));
        self
    }

    /// Build the composite namespace.
    ///
    /// Fails if a store's guest path has an empty, `.` or `..` element, two
    /// mounts land on the same guest path, or a host directory cannot be used.
    pub fn build(self) -> Result<CompositeFS> {
        let mut table: BTreeMap<String, (String, Arc<dyn FileSystem>)> = BTreeMap::new();

        for (guest, fs) in self.stores {
            let key = filesystem::compositefs::normalize_mount_path(&guest)
                .ok_or_else(|| Error::InvalidMount(guest.clone()))?;
            if table.insert(key.clone(), (guest, fs)).is_some() {
                return Err(Error::DuplicateMount(key));
            }
        }

        for spec in self.mounts {
            if table.contains_key(&spec.guest) {
                return Err(Error::DuplicateMount(spec.guest));
            }
            let fs = host_store(&spec)?;
            tracing::debug!("mounting {} at {:?}", spec.host.display(), spec.guest);
            table.insert(spec.guest.clone(), (spec.guest, fs));
        }

        CompositeFS::new(table.into_values())
    }
}

#[cfg(unix)]
fn host_store(spec: &MountSpec) -> Result<Arc<dyn FileSystem>> {
    if !spec.host.is_dir() {
        return Err(Error::MountNotDirectory(spec.host.display().to_string()));
    }
    let fs = HostFS::new(&spec.host)
        .map_err(|_| Error::MountNotDirectory(spec.host.display().to_string()))?;
    Ok(Arc::new(fs))
}

#[cfg(not(unix))]
fn host_store(spec: &MountSpec) -> Result<Arc<dyn FileSystem>> {
    Err(Error::MountNotDirectory(spec.host.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_mount_spec_parse() {
        let spec = MountSpec::parse("/srv/data:/data/").unwrap();
        assert_eq!(spec.host, PathBuf::from("/srv/data"));
        assert_eq!(spec.guest, "data");

        let spec: MountSpec = "/srv/data".parse().unwrap();
        assert_eq!(spec.guest, "");

        assert_eq!(MountSpec::parse("/srv:.").unwrap().guest, "");
        assert_eq!(MountSpec::parse("/srv:/").unwrap().guest, "");
        assert_eq!(MountSpec::parse("/srv:a/b").unwrap().guest, "a/b");
    }

    #[test]
    fn test_mount_spec_rejects_bad_values() {
        for bad in [":guest", "", "/srv:a/../b", "/srv:a//b", "/srv:a/./b"] {
            assert!(
                matches!(MountSpec::parse(bad), Err(Error::InvalidMount(_))),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn test_fs_options_build() -> anyhow::Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("bear.txt"), b"pooh")?;

        let fs = FsOptions::new()
            .with_mount(MountSpec::parse(&format!("{}:/host", dir.path().display()))?)
            .with_store("mem", Arc::new(MemFS::new().with_file("fish.txt", "nemo")))
            .build()?;

        assert_eq!(fs.read_file("host/bear.txt").await?.unwrap(), b"pooh");
        assert_eq!(fs.read_file("mem/fish.txt").await?.unwrap(), b"nemo");
        assert_eq!(fs.mounts(), vec!["host", "mem"]);
        Ok(())
    }

    #[test]
    fn test_fs_options_duplicates_and_missing_dirs() {
        let store: Arc<dyn FileSystem> = Arc::new(MemFS::new());
        let err = FsOptions::new()
            .with_store(".", store.clone())
            .with_store("/", store)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::DuplicateMount(ref p) if p.is_empty()));

        let err = FsOptions::new()
            .with_mount(MountSpec::parse("/definitely/not/here:/x").unwrap())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::MountNotDirectory(_)));
    }

    #[test]
    fn test_fs_options_rejects_unreachable_store_paths() {
        for bad in ["a//b", "a/./b", "../a", "a/.."] {
            let err = FsOptions::new()
                .with_store(bad, Arc::new(MemFS::new()))
                .build()
                .err()
                .unwrap();
            assert!(matches!(err, Error::InvalidMount(ref p) if p == bad), "{bad}");
        }
    }
}
