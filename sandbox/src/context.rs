//! Host configuration and the per-host call context.

use std::sync::Arc;
use tracing::debug;

use hostabi_sdk::{CompositeFS, FileSystem};

use crate::{
    clock::{
        Clocks, FakeNanotime, FrozenWalltime, SystemNanotime, SystemWalltime, TimeSource,
    },
    errno::Errno,
    hostcall::{self, DispatchError, HostCall},
    memory::{GuestMemory, LinearMemory},
};

/// Builder for a [`Host`].
#[derive(Clone)]
pub struct HostConfig {
    walltime: Arc<dyn TimeSource>,
    nanotime: Arc<dyn TimeSource>,
    fs: Arc<dyn FileSystem>,
    memory_pages: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            walltime: Arc::new(SystemWalltime),
            nanotime: Arc::new(SystemNanotime::new()),
            fs: Arc::new(CompositeFS::default()),
            memory_pages: 1,
        }
    }
}

impl HostConfig {
    /// Real clocks, an empty namespace and one page of memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall clock frozen at 2022-01-01T00:00:00Z and a fake monotonic clock
    /// starting at 0.
    pub fn deterministic() -> Self {
        Self::default()
            .with_walltime(Arc::new(FrozenWalltime::default()))
            .with_nanotime(Arc::new(FakeNanotime::default()))
    }

    pub fn with_walltime(mut self, walltime: Arc<dyn TimeSource>) -> Self {
        self.walltime = walltime;
        self
    }

    pub fn with_nanotime(mut self, nanotime: Arc<dyn TimeSource>) -> Self {
        self.nanotime = nanotime;
        self
    }

    /// Set the guest-visible namespace.
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_memory_pages(mut self, pages: u32) -> Self {
        self.memory_pages = pages;
        self
    }

    pub fn build(self) -> Host {
        Host {
            clocks: Clocks::new(self.walltime, self.nanotime),
            fs: self.fs,
            memory_pages: self.memory_pages,
        }
    }
}

/// Shared state behind the host calls of one or more guest instances.
///
/// A `Host` is immutable apart from whatever its time sources keep, so it
/// can be shared across threads.
#[derive(Clone)]
pub struct Host {
    clocks: Clocks,
    fs: Arc<dyn FileSystem>,
    memory_pages: u32,
}

impl Host {
    pub fn clocks(&self) -> &Clocks {
        &self.clocks
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// A fresh zeroed memory of the configured size.
    pub fn new_memory(&self) -> LinearMemory {
        LinearMemory::new(self.memory_pages)
    }

    /// Run a decoded host call against `mem` and return the errno for the guest.
    pub fn call<M: GuestMemory + ?Sized>(&self, mem: &mut M, call: HostCall) -> Errno {
        debug!("--> {}", call);
        let result = match call {
            HostCall::ClockResGet {
                id,
                result_resolution,
            } => hostcall::clock::clock_res_get(&self.clocks, mem, id, result_resolution),
            HostCall::ClockTimeGet {
                id,
                precision,
                result_timestamp,
            } => hostcall::clock::clock_time_get(
                &self.clocks,
                mem,
                id,
                precision,
                result_timestamp,
            ),
            HostCall::PollOneoff {
                input,
                output,
                nsubscriptions,
                result_nevents,
            } => hostcall::poll::poll_oneoff(mem, input, output, nsubscriptions, result_nevents),
        };
        let errno = result.err().unwrap_or(Errno::Success);
        debug!("<-- {}", errno.name());
        errno
    }

    /// Decode `name(args..)` and run it.
    pub fn call_raw<M: GuestMemory + ?Sized>(
        &self,
        mem: &mut M,
        name: &str,
        args: &[u64],
    ) -> Result<Errno, DispatchError> {
        let call = HostCall::decode(name, args)?;
        Ok(self.call(mem, call))
    }
}
