//! Clock service and the time sources behind it.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Instant, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

/// 2022-01-01T00:00:00Z, the instant reported by [`FrozenWalltime::default`].
pub const FROZEN_WALLTIME_NANOS: u64 = 1_640_995_200_000_000_000;

/// Resolution of the realtime clock in nanoseconds.
pub const REALTIME_RESOLUTION: u64 = 1000;

/// Resolution of the monotonic clock in nanoseconds.
pub const MONOTONIC_RESOLUTION: u64 = 1;

/// Clock identities defined by the ABI. Only the first two are backed by a
/// time source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ClockId {
    Realtime = 0,
    Monotonic = 1,
    ProcessCputime = 2,
    ThreadCputime = 3,
}

impl ClockId {
    pub fn from_raw(id: u32) -> Option<Self> {
        match id {
            0 => Some(ClockId::Realtime),
            1 => Some(ClockId::Monotonic),
            2 => Some(ClockId::ProcessCputime),
            3 => Some(ClockId::ThreadCputime),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock {0} is not supported")]
    Unsupported(u32),
}

/// A source of nanosecond timestamps.
pub trait TimeSource: Send + Sync {
    fn now_nanos(&self) -> u64;
}

/// Wall-clock time since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemWalltime;

impl TimeSource for SystemWalltime {
    fn now_nanos(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Nanoseconds since the source was created, unaffected by wall-clock changes.
#[derive(Debug, Clone, Copy)]
pub struct SystemNanotime {
    anchor: Instant,
}

impl SystemNanotime {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemNanotime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemNanotime {
    fn now_nanos(&self) -> u64 {
        u64::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// A wall clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FrozenWalltime(pub u64);

impl Default for FrozenWalltime {
    fn default() -> Self {
        Self(FROZEN_WALLTIME_NANOS)
    }
}

impl TimeSource for FrozenWalltime {
    fn now_nanos(&self) -> u64 {
        self.0
    }
}

/// Deterministic monotonic clock: the first read is 0 and each read advances
/// by `step` nanoseconds.
#[derive(Debug)]
pub struct FakeNanotime {
    next: AtomicU64,
    step: u64,
}

impl FakeNanotime {
    pub const DEFAULT_STEP: u64 = 1_000_000;

    pub fn new(step: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            step,
        }
    }

    /// Rewind to 0.
    pub fn reset(&self) {
        self.next.store(0, Ordering::SeqCst);
    }
}

impl Default for FakeNanotime {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STEP)
    }
}

impl TimeSource for FakeNanotime {
    fn now_nanos(&self) -> u64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

/// The realtime and monotonic clocks visible to a guest.
#[derive(Clone)]
pub struct Clocks {
    walltime: Arc<dyn TimeSource>,
    nanotime: Arc<dyn TimeSource>,
}

impl Clocks {
    pub fn new(walltime: Arc<dyn TimeSource>, nanotime: Arc<dyn TimeSource>) -> Self {
        Self { walltime, nanotime }
    }

    /// Real wall clock and a monotonic clock anchored now.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemWalltime), Arc::new(SystemNanotime::new()))
    }

    /// Frozen wall clock and a fake monotonic clock starting at 0.
    pub fn deterministic() -> Self {
        Self::new(
            Arc::new(FrozenWalltime::default()),
            Arc::new(FakeNanotime::default()),
        )
    }

    /// Nominal resolution of clock `id` in nanoseconds.
    pub fn resolution(&self, id: u32) -> Result<u64, ClockError> {
        match ClockId::from_raw(id) {
            Some(ClockId::Realtime) => Ok(REALTIME_RESOLUTION),
            Some(ClockId::Monotonic) => Ok(MONOTONIC_RESOLUTION),
            _ => Err(ClockError::Unsupported(id)),
        }
    }

    /// Current value of clock `id` in nanoseconds.
    ///
    /// `precision` is accepted and ignored: the value is never rounded.
    pub fn now(&self, id: u32, _precision: u64) -> Result<u64, ClockError> {
        match ClockId::from_raw(id) {
            Some(ClockId::Realtime) => Ok(self.walltime.now_nanos()),
            Some(ClockId::Monotonic) => Ok(self.nanotime.now_nanos()),
            _ => Err(ClockError::Unsupported(id)),
        }
    }
}

impl Default for Clocks {
    fn default() -> Self {
        Self::system()
    }
}
