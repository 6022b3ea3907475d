//! Generic behavioural checks every [`FileSystem`] implementation must pass.
//!
//! [`check_conformance`] walks a store from its root and cross-checks the
//! listing, lookup and open paths against each other. It is used by the
//! store tests in this crate and is public so embedders can validate their
//! own stores before mounting them.

use anyhow::{bail, ensure, Context, Result};
use std::collections::{BTreeSet, VecDeque};

use super::{join_path, FileSystem, FsError};

/// Walk `fs` and fail with a descriptive error on the first inconsistency.
///
/// `expected` lists paths (files or directories) that must be reachable by
/// walking from the root.
pub async fn check_conformance(fs: &dyn FileSystem, expected: &[&str]) -> Result<()> {
    let root = fs
        .stat(".")
        .await?
        .context("root directory does not stat")?;
    ensure!(root.is_directory(), "root is not a directory");

    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([".".to_string()]);

    while let Some(dir) = queue.pop_front() {
        let names = fs
            .readdir(&dir)
            .await?
            .with_context(|| format!("{}: readdir returned nothing for a directory", dir))?;
        let entries = fs
            .readdir_plus(&dir)
            .await?
            .with_context(|| format!("{}: readdir_plus returned nothing for a directory", dir))?;

        let plus_names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        ensure!(
            names.iter().map(String::as_str).eq(plus_names.iter().copied()),
            "{}: readdir {:?} disagrees with readdir_plus {:?}",
            dir,
            names,
            plus_names
        );
        ensure!(
            names.windows(2).all(|w| w[0] < w[1]),
            "{}: listing is not sorted: {:?}",
            dir,
            names
        );

        for entry in entries {
            let path = join_path(&dir, &entry.name);
            let stats = fs
                .stat(&path)
                .await?
                .with_context(|| format!("{}: listed but does not stat", path))?;
            ensure!(
                stats.is_directory() == entry.stats.is_directory(),
                "{}: listing and stat disagree on the entry kind",
                path
            );

            let handle = fs
                .open(&path)
                .await
                .with_context(|| format!("{}: listed but does not open", path))?;
            let fstat = handle.fstat().await?;
            ensure!(
                fstat.is_directory() == stats.is_directory(),
                "{}: fstat and stat disagree on the entry kind",
                path
            );

            if stats.is_directory() {
                queue.push_back(path.clone());
            } else {
                check_file(fs, &path, fstat.size).await?;
            }
            seen.insert(path);
        }
    }

    for path in expected {
        ensure!(
            seen.contains(*path),
            "{}: expected path not found while walking",
            path
        );
    }

    check_missing(fs, &seen).await
}

async fn check_file(fs: &dyn FileSystem, path: &str, size: i64) -> Result<()> {
    let first = fs
        .read_file(path)
        .await?
        .with_context(|| format!("{}: read_file returned nothing for a file", path))?;
    let second = fs.read_file(path).await?.unwrap_or_default();
    ensure!(first == second, "{}: repeated reads differ", path);
    ensure!(
        first.len() as i64 == size,
        "{}: fstat size {} but {} bytes read",
        path,
        size,
        first.len()
    );

    let len = first.len() as u64;
    let reopened = fs.open(path).await?.pread(0, len + 1).await?;
    ensure!(reopened == first, "{}: reopened content differs", path);

    let by_path = fs.pread(path, 0, len).await?.unwrap_or_default();
    ensure!(by_path == first, "{}: pread by path differs from read_file", path);
    Ok(())
}

async fn check_missing(fs: &dyn FileSystem, seen: &BTreeSet<String>) -> Result<()> {
    let mut missing = String::from("conformance-missing");
    while seen.contains(&missing) {
        missing.push('_');
    }

    match fs.open(&missing).await {
        Ok(_) => bail!("{}: missing path opened", missing),
        Err(e) => ensure!(
            FsError::of(&e) == Some(FsError::NotFound),
            "{}: open of a missing path failed with {:#} instead of not-found",
            missing,
            e
        ),
    }
    ensure!(
        fs.stat(&missing).await?.is_none(),
        "{}: missing path stats",
        missing
    );
    ensure!(
        fs.read_file(&missing).await?.is_none(),
        "{}: missing path reads",
        missing
    );
    Ok(())
}
