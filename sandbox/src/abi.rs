//! Fixed-layout records exchanged with the guest by `poll_oneoff`.
//!
//! All fields are little-endian. Padding bytes are skipped on input and left
//! untouched on output.
//!
//! ```text
//! subscription (48 bytes)          event (32 bytes)
//!   0  u64 userdata                  0  u64 userdata
//!   8  u8  type                      8  u16 errno
//!  16  u8  clock id | u32 fd        10  u32 type
//!  24  u64 timeout                  16  u64 nbytes   (fd events)
//!  32  u64 precision                24  u16 flags    (fd events)
//!  40  u8  flags
//! ```

use crate::errno::Errno;

pub const SUBSCRIPTION_SIZE: u32 = 48;
pub const EVENT_SIZE: u32 = 32;

pub const EVENT_TYPE_CLOCK: u8 = 0;
pub const EVENT_TYPE_FD_READ: u8 = 1;
pub const EVENT_TYPE_FD_WRITE: u8 = 2;

/// Bit 0 of the clock subscription flags: the timeout is an absolute time.
pub const SUBSCRIPTION_CLOCK_ABSTIME: u8 = 1;

fn u32_at(raw: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&raw[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn u64_at(raw: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&raw[at..at + 8]);
    u64::from_le_bytes(buf)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSubscription {
    pub id: u8,
    pub timeout: u64,
    pub precision: u64,
    pub flags: u8,
}

impl ClockSubscription {
    pub fn is_absolute(&self) -> bool {
        self.flags & SUBSCRIPTION_CLOCK_ABSTIME != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Clock(ClockSubscription),
    FdRead { fd: u32 },
    FdWrite { fd: u32 },
    /// A type tag this host does not know, kept so it can be echoed back.
    Unknown(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub userdata: u64,
    pub kind: SubscriptionKind,
}

impl Subscription {
    pub fn clock(userdata: u64, clock: ClockSubscription) -> Self {
        Self {
            userdata,
            kind: SubscriptionKind::Clock(clock),
        }
    }

    /// Decode one record. Returns `None` if `raw` is shorter than
    /// [`SUBSCRIPTION_SIZE`].
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let raw = raw.get(..SUBSCRIPTION_SIZE as usize)?;
        let kind = match raw[8] {
            EVENT_TYPE_CLOCK => SubscriptionKind::Clock(ClockSubscription {
                id: raw[16],
                timeout: u64_at(raw, 24),
                precision: u64_at(raw, 32),
                flags: raw[40],
            }),
            EVENT_TYPE_FD_READ => SubscriptionKind::FdRead {
                fd: u32_at(raw, 16),
            },
            EVENT_TYPE_FD_WRITE => SubscriptionKind::FdWrite {
                fd: u32_at(raw, 16),
            },
            other => SubscriptionKind::Unknown(other),
        };
        Some(Self {
            userdata: u64_at(raw, 0),
            kind,
        })
    }

    /// The type tag of this subscription.
    pub fn event_type(&self) -> u8 {
        match self.kind {
            SubscriptionKind::Clock(_) => EVENT_TYPE_CLOCK,
            SubscriptionKind::FdRead { .. } => EVENT_TYPE_FD_READ,
            SubscriptionKind::FdWrite { .. } => EVENT_TYPE_FD_WRITE,
            SubscriptionKind::Unknown(tag) => tag,
        }
    }

    /// Encode as the guest would lay it out, padding zeroed.
    pub fn encode(&self) -> [u8; SUBSCRIPTION_SIZE as usize] {
        let mut raw = [0u8; SUBSCRIPTION_SIZE as usize];
        raw[0..8].copy_from_slice(&self.userdata.to_le_bytes());
        raw[8] = self.event_type();
        match self.kind {
            SubscriptionKind::Clock(clock) => {
                raw[16] = clock.id;
                raw[24..32].copy_from_slice(&clock.timeout.to_le_bytes());
                raw[32..40].copy_from_slice(&clock.precision.to_le_bytes());
                raw[40] = clock.flags;
            }
            SubscriptionKind::FdRead { fd } | SubscriptionKind::FdWrite { fd } => {
                raw[16..20].copy_from_slice(&fd.to_le_bytes());
            }
            SubscriptionKind::Unknown(_) => {}
        }
        raw
    }
}

/// The host's answer to one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub userdata: u64,
    pub errno: Errno,
    pub event_type: u8,
}

impl Event {
    pub fn for_subscription(sub: &Subscription, errno: Errno) -> Self {
        Self {
            userdata: sub.userdata,
            errno,
            event_type: sub.event_type(),
        }
    }

    fn is_fd(&self) -> bool {
        matches!(self.event_type, EVENT_TYPE_FD_READ | EVENT_TYPE_FD_WRITE)
    }

    /// Write into a 32-byte event slot. Clock events only touch bytes 0..14;
    /// fd events also write an empty `fd_readwrite` payload.
    pub fn write_to(&self, slot: &mut [u8]) -> Result<(), Errno> {
        let slot = slot.get_mut(..EVENT_SIZE as usize).ok_or(Errno::Fault)?;
        slot[0..8].copy_from_slice(&self.userdata.to_le_bytes());
        slot[8..10].copy_from_slice(&self.errno.code().to_le_bytes());
        slot[10..14].copy_from_slice(&u32::from(self.event_type).to_le_bytes());
        if self.is_fd() {
            slot[16..24].copy_from_slice(&0u64.to_le_bytes());
            slot[24..26].copy_from_slice(&0u16.to_le_bytes());
        }
        Ok(())
    }

    /// Decode an event slot. Returns `None` for short input or an errno this
    /// host never writes.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let raw = raw.get(..EVENT_SIZE as usize)?;
        let errno = Errno::from_code(u16::from_le_bytes([raw[8], raw[9]]))?;
        Some(Self {
            userdata: u64_at(raw, 0),
            errno,
            event_type: u8::try_from(u32_at(raw, 10)).ok()?,
        })
    }
}
