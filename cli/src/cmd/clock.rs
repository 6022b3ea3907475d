use anyhow::{Context, Result as AnyhowResult};
use hostabi_sandbox::{Errno, GuestMemory, HostCall};

use crate::cmd::open_host;

const RESULT_RESOLUTION: u32 = 0;
const RESULT_TIMESTAMP: u32 = 8;

/// Run `clock_res_get` and `clock_time_get` for clock `id` and print both
/// results. Fails with the errno name if either call does not succeed.
pub fn clock_command(
    stdout: &mut impl std::io::Write,
    deterministic: bool,
    id: u32,
    precision: u64,
) -> AnyhowResult<()> {
    let host = open_host(deterministic, Vec::new())?;
    let mut mem = host.new_memory();

    let errno = host.call(
        &mut mem,
        HostCall::ClockResGet {
            id,
            result_resolution: RESULT_RESOLUTION,
        },
    );
    if errno != Errno::Success {
        anyhow::bail!("clock_res_get(id={}) failed: {}", id, errno);
    }
    let resolution = mem
        .read_u64_le(RESULT_RESOLUTION)
        .context("resolution not written")?;
    writeln!(stdout, "resolution: {} ns", resolution)?;

    let errno = host.call(
        &mut mem,
        HostCall::ClockTimeGet {
            id,
            precision,
            result_timestamp: RESULT_TIMESTAMP,
        },
    );
    if errno != Errno::Success {
        anyhow::bail!("clock_time_get(id={}) failed: {}", id, errno);
    }
    let timestamp = mem
        .read_u64_le(RESULT_TIMESTAMP)
        .context("timestamp not written")?;
    writeln!(stdout, "timestamp: {} ns", timestamp)?;

    Ok(())
}
