use clap::{Parser, Subcommand};
use hostabi_sdk::MountSpec;

#[derive(Parser, Debug)]
#[command(name = "hostabi")]
#[command(version = env!("HOSTABI_VERSION"))]
#[command(about = "Host call layer for sandboxed guests", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Browse the guest-visible namespace
    Fs {
        /// Mount a host directory, `<host-dir>[:<guest-path>]` (can be specified multiple times)
        #[arg(long = "mount", value_name = "HOST_DIR[:GUEST_PATH]", global = true)]
        mounts: Vec<MountSpec>,

        #[command(subcommand)]
        command: FsCommand,
    },
    /// Query a clock through clock_res_get and clock_time_get
    Clock {
        /// Use a frozen wall clock and a fake monotonic clock
        #[arg(long)]
        deterministic: bool,

        /// Clock id (0 realtime, 1 monotonic, 2 process cputime, 3 thread cputime)
        #[arg(long, default_value_t = 0)]
        id: u32,

        /// Precision passed to clock_time_get, in nanoseconds
        #[arg(long, default_value_t = 0)]
        precision: u64,
    },
    /// Run poll_oneoff over one clock subscription and optional fd subscriptions
    Poll {
        /// Use a frozen wall clock and a fake monotonic clock
        #[arg(long)]
        deterministic: bool,

        /// Relative timeout of the clock subscription, in nanoseconds
        #[arg(long, default_value_t = 0)]
        timeout: u64,

        /// Add an fd_read subscription for this descriptor (can be specified multiple times)
        #[arg(long = "fd", value_name = "FD")]
        fds: Vec<u32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum FsCommand {
    /// List files recursively
    Ls {
        /// Path to list (default: /)
        #[arg(default_value = "/")]
        fs_path: String,
    },
    /// Display file contents
    Cat {
        /// Path to the file in the namespace
        file_path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fs_mounts_after_subcommand() {
        let args = Args::try_parse_from([
            "hostabi",
            "fs",
            "ls",
            "--mount",
            "/srv/a:animals",
            "--mount",
            "/srv/b",
        ])
        .unwrap();
        match args.command {
            Command::Fs {
                mounts,
                command: FsCommand::Ls { fs_path },
            } => {
                assert_eq!(fs_path, "/");
                assert_eq!(mounts.len(), 2);
                assert_eq!(mounts[0].guest, "animals");
                assert_eq!(mounts[1].guest, "");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_bad_mount() {
        assert!(Args::try_parse_from(["hostabi", "fs", "--mount", ":x", "ls"]).is_err());
    }

    #[test]
    fn test_parse_poll() {
        let args = Args::try_parse_from([
            "hostabi",
            "poll",
            "--deterministic",
            "--fd",
            "0",
            "--fd",
            "1",
        ])
        .unwrap();
        match args.command {
            Command::Poll {
                deterministic,
                timeout,
                fds,
            } => {
                assert!(deterministic);
                assert_eq!(timeout, 0);
                assert_eq!(fds, vec![0, 1]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
