use clap::Parser;

use hostabi::{
    cmd, get_runtime,
    parser::{Args, Command, FsCommand},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    reset_sigpipe();

    let args = Args::parse();

    let default_env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::ERROR.into())
        .from_env_lossy();
    if let Err(e) = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_line_number(true)
                .with_thread_ids(true),
        )
        .with(default_env_filter)
        .try_init()
    {
        eprintln!("Unable to setup tracing appender: {e:?}");
    }

    let result = match args.command {
        Command::Fs { mounts, command } => get_runtime().and_then(|rt| match command {
            FsCommand::Ls { fs_path } => rt.block_on(cmd::fs::ls_filesystem(
                &mut std::io::stdout(),
                mounts,
                &fs_path,
            )),
            FsCommand::Cat { file_path } => rt.block_on(cmd::fs::cat_filesystem(
                &mut std::io::stdout(),
                mounts,
                &file_path,
            )),
        }),
        Command::Clock {
            deterministic,
            id,
            precision,
        } => cmd::clock::clock_command(&mut std::io::stdout(), deterministic, id, precision),
        Command::Poll {
            deterministic,
            timeout,
            fds,
        } => cmd::poll::poll_command(&mut std::io::stdout(), deterministic, timeout, fds),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Reset SIGPIPE to the default behavior (terminate the process) so that
/// piping output to tools like `head` doesn't cause a panic.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

#[cfg(not(unix))]
fn reset_sigpipe() {}
