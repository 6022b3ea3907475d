use tracing::debug;

use crate::{clock::Clocks, errno::Errno, memory::GuestMemory, memory::Region};

/// `clock_res_get(id, result.resolution)`
pub fn clock_res_get<M: GuestMemory + ?Sized>(
    clocks: &Clocks,
    mem: &mut M,
    id: u32,
    result_resolution: u32,
) -> Result<(), Errno> {
    let out = Region::acquire(mem, result_resolution, 8)?;
    let resolution = clocks.resolution(id).map_err(|e| {
        debug!("clockResGet(id={}) -> {}", id, e);
        Errno::from(e)
    })?;
    debug!("clockResGet(id={}) -> resolution={}", id, resolution);
    out.write(mem, &resolution.to_le_bytes())
}

/// `clock_time_get(id, precision, result.timestamp)`
///
/// `precision` does not round the timestamp.
pub fn clock_time_get<M: GuestMemory + ?Sized>(
    clocks: &Clocks,
    mem: &mut M,
    id: u32,
    precision: u64,
    result_timestamp: u32,
) -> Result<(), Errno> {
    let out = Region::acquire(mem, result_timestamp, 8)?;
    let timestamp = clocks.now(id, precision).map_err(|e| {
        debug!("clockTimeGet(id={},precision={}) -> {}", id, precision, e);
        Errno::from(e)
    })?;
    debug!(
        "clockTimeGet(id={},precision={}) -> timestamp={}",
        id, precision, timestamp
    );
    out.write(mem, &timestamp.to_le_bytes())
}
