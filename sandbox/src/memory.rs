//! Guest linear memory and validated regions.
//!
//! Host calls never index guest memory with a raw guest offset. Every offset
//! and length coming from the guest is first turned into a [`Region`], which
//! fails with `EFAULT` unless the whole range lies inside memory. A call
//! acquires all of its regions before it writes anything, so a fault never
//! leaves partial output behind.

use tracing::debug;

use crate::errno::Errno;

/// Size of one wasm page.
pub const PAGE_SIZE: u32 = 65536;

/// Maximum number of pages addressable with 32-bit offsets.
pub const MAX_PAGES: u32 = 65536;

/// Bounds-checked access to a guest's linear memory.
///
/// Accessors return `None`/`false` for any range that is not fully inside
/// memory; they never panic on guest-supplied values.
pub trait GuestMemory {
    /// Current size in bytes.
    fn size(&self) -> u64;

    fn read(&self, offset: u32, len: usize) -> Option<&[u8]>;

    fn read_mut(&mut self, offset: u32, len: usize) -> Option<&mut [u8]>;

    fn write(&mut self, offset: u32, bytes: &[u8]) -> bool {
        match self.read_mut(offset, bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    fn read_u32_le(&self, offset: u32) -> Option<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.read(offset, 4)?);
        Some(u32::from_le_bytes(buf))
    }

    fn read_u64_le(&self, offset: u32) -> Option<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.read(offset, 8)?);
        Some(u64::from_le_bytes(buf))
    }

    fn write_u32_le(&mut self, offset: u32, value: u32) -> bool {
        self.write(offset, &value.to_le_bytes())
    }

    fn write_u64_le(&mut self, offset: u32, value: u64) -> bool {
        self.write(offset, &value.to_le_bytes())
    }
}

/// A plain byte vector standing in for a wasm linear memory.
#[derive(Debug, Clone)]
pub struct LinearMemory {
    bytes: Vec<u8>,
}

impl LinearMemory {
    /// Allocate `pages` zeroed pages (clamped to [`MAX_PAGES`]).
    pub fn new(pages: u32) -> Self {
        let pages = pages.min(MAX_PAGES) as usize;
        Self {
            bytes: vec![0; pages * PAGE_SIZE as usize],
        }
    }

    pub fn pages(&self) -> u32 {
        (self.bytes.len() / PAGE_SIZE as usize) as u32
    }

    /// Grow by `delta` pages. Returns the previous page count, or `None` if
    /// the result would exceed [`MAX_PAGES`].
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let previous = self.pages();
        let pages = previous.checked_add(delta).filter(|p| *p <= MAX_PAGES)?;
        self.bytes.resize(pages as usize * PAGE_SIZE as usize, 0);
        Some(previous)
    }

    /// Overwrite the whole memory with `byte`.
    pub fn fill(&mut self, byte: u8) {
        self.bytes.fill(byte);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl GuestMemory for LinearMemory {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read(&self, offset: u32, len: usize) -> Option<&[u8]> {
        let start = offset as usize;
        self.bytes.get(start..start.checked_add(len)?)
    }

    fn read_mut(&mut self, offset: u32, len: usize) -> Option<&mut [u8]> {
        let start = offset as usize;
        self.bytes.get_mut(start..start.checked_add(len)?)
    }
}

/// A guest range that was checked against the memory size.
///
/// Memory only ever grows, so a region stays valid for the memory it was
/// acquired from for the rest of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    offset: u32,
    len: usize,
}

impl Region {
    /// Validate `len` bytes starting at `offset`.
    pub fn acquire<M: GuestMemory + ?Sized>(mem: &M, offset: u32, len: u64) -> Result<Self, Errno> {
        let end = u64::from(offset).checked_add(len);
        match end {
            Some(end) if end <= mem.size() => Ok(Self {
                offset,
                len: len as usize,
            }),
            _ => {
                debug!(
                    "fault: offset={} len={} exceeds memory size {}",
                    offset,
                    len,
                    mem.size()
                );
                Err(Errno::Fault)
            }
        }
    }

    /// Validate an array of `count` records of `stride` bytes each.
    pub fn array<M: GuestMemory + ?Sized>(
        mem: &M,
        offset: u32,
        count: u32,
        stride: u32,
    ) -> Result<Self, Errno> {
        Self::acquire(mem, offset, u64::from(count) * u64::from(stride))
    }

    pub fn bytes<'m, M: GuestMemory + ?Sized>(&self, mem: &'m M) -> Result<&'m [u8], Errno> {
        mem.read(self.offset, self.len).ok_or(Errno::Fault)
    }

    pub fn bytes_mut<'m, M: GuestMemory + ?Sized>(
        &self,
        mem: &'m mut M,
    ) -> Result<&'m mut [u8], Errno> {
        mem.read_mut(self.offset, self.len).ok_or(Errno::Fault)
    }

    /// Copy `bytes` to the start of the region; `bytes` must fit.
    pub fn write<M: GuestMemory + ?Sized>(&self, mem: &mut M, bytes: &[u8]) -> Result<(), Errno> {
        self.bytes_mut(mem)?
            .get_mut(..bytes.len())
            .ok_or(Errno::Fault)?
            .copy_from_slice(bytes);
        Ok(())
    }
}
