//! Host side of the guest ABI: clocks, `poll_oneoff` and the bounds-checked
//! guest memory they work on.

pub mod abi;
pub mod clock;
pub mod context;
pub mod errno;
pub mod hostcall;
pub mod memory;

pub use clock::{
    ClockError, ClockId, Clocks, FakeNanotime, FrozenWalltime, SystemNanotime, SystemWalltime,
    TimeSource,
};
pub use context::{Host, HostConfig};
pub use errno::Errno;
pub use hostcall::{DispatchError, HostCall};
pub use memory::{GuestMemory, LinearMemory, Region, PAGE_SIZE};
