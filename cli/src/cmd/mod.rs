pub mod clock;
pub mod fs;
pub mod poll;

use std::sync::Arc;

use anyhow::{Context, Result};
use hostabi_sandbox::{Host, HostConfig};
use hostabi_sdk::{FsOptions, MountSpec};

/// Build a host with the given mounts. `deterministic` swaps in the frozen
/// wall clock and the fake monotonic clock.
pub fn open_host(deterministic: bool, mounts: Vec<MountSpec>) -> Result<Host> {
    let fs = mounts
        .into_iter()
        .fold(FsOptions::new(), FsOptions::with_mount)
        .build()
        .context("Failed to configure mounts")?;

    let config = if deterministic {
        HostConfig::deterministic()
    } else {
        HostConfig::new()
    };
    Ok(config.with_fs(Arc::new(fs)).build())
}
