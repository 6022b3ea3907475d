//! Host call surface.
//!
//! An embedder hands us a function name and its raw wasm arguments;
//! [`HostCall::decode`] turns them into typed parameters and
//! [`Host::call`](crate::Host::call) runs the call against guest memory,
//! logging entry and exit at `debug`.

pub mod clock;
pub mod poll;

use std::fmt;
use thiserror::Error;

pub const CLOCK_RES_GET: &str = "clock_res_get";
pub const CLOCK_TIME_GET: &str = "clock_time_get";
pub const POLL_ONEOFF: &str = "poll_oneoff";

/// Embedder-side dispatch failures. These are programming errors in the
/// caller, not guest-visible outcomes, so they never become an errno.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown host function: {0}")]
    UnknownFunction(String),

    #[error("{name} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// A decoded host call. Offsets are guest memory offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    ClockResGet {
        id: u32,
        result_resolution: u32,
    },
    ClockTimeGet {
        id: u32,
        precision: u64,
        result_timestamp: u32,
    },
    PollOneoff {
        input: u32,
        output: u32,
        nsubscriptions: u32,
        result_nevents: u32,
    },
}

/// wasm i32 parameters arrive widened to 64 bits; only the low half counts.
fn i32_arg(raw: u64) -> u32 {
    raw as u32
}

fn expect_args(name: &'static str, args: &[u64], expected: usize) -> Result<(), DispatchError> {
    if args.len() != expected {
        return Err(DispatchError::ArgumentCount {
            name,
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

impl HostCall {
    pub fn decode(name: &str, args: &[u64]) -> Result<Self, DispatchError> {
        match name {
            CLOCK_RES_GET => {
                expect_args(CLOCK_RES_GET, args, 2)?;
                Ok(HostCall::ClockResGet {
                    id: i32_arg(args[0]),
                    result_resolution: i32_arg(args[1]),
                })
            }
            CLOCK_TIME_GET => {
                expect_args(CLOCK_TIME_GET, args, 3)?;
                Ok(HostCall::ClockTimeGet {
                    id: i32_arg(args[0]),
                    precision: args[1],
                    result_timestamp: i32_arg(args[2]),
                })
            }
            POLL_ONEOFF => {
                expect_args(POLL_ONEOFF, args, 4)?;
                Ok(HostCall::PollOneoff {
                    input: i32_arg(args[0]),
                    output: i32_arg(args[1]),
                    nsubscriptions: i32_arg(args[2]),
                    result_nevents: i32_arg(args[3]),
                })
            }
            other => Err(DispatchError::UnknownFunction(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostCall::ClockResGet { .. } => CLOCK_RES_GET,
            HostCall::ClockTimeGet { .. } => CLOCK_TIME_GET,
            HostCall::PollOneoff { .. } => POLL_ONEOFF,
        }
    }
}

impl fmt::Display for HostCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostCall::ClockResGet {
                id,
                result_resolution,
            } => write!(
                f,
                "{}(id={},result.resolution={})",
                self.name(),
                id,
                result_resolution
            ),
            HostCall::ClockTimeGet {
                id,
                precision,
                result_timestamp,
            } => write!(
                f,
                "{}(id={},precision={},result.timestamp={})",
                self.name(),
                id,
                precision,
                result_timestamp
            ),
            HostCall::PollOneoff {
                input,
                output,
                nsubscriptions,
                result_nevents,
            } => write!(
                f,
                "{}(in={},out={},nsubscriptions={},result.nevents={})",
                self.name(),
                input,
                output,
                nsubscriptions,
                result_nevents
            ),
        }
    }
}
