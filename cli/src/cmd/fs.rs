use std::collections::VecDeque;

use anyhow::{Context, Result as AnyhowResult};
use hostabi_sandbox::Errno;
use hostabi_sdk::MountSpec;

use crate::cmd::open_host;

/// Print every entry below `path`, breadth first, as `d <path>` or `f <path>`.
pub async fn ls_filesystem(
    stdout: &mut impl std::io::Write,
    mounts: Vec<MountSpec>,
    path: &str,
) -> AnyhowResult<()> {
    let host = open_host(false, mounts)?;
    let fs = host.fs();

    let root = path.trim_matches('/');
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(root.to_string());

    while let Some(prefix) = queue.pop_front() {
        let dir = if prefix.is_empty() { "." } else { prefix.as_str() };
        let entries = match fs.readdir_plus(dir).await {
            Ok(Some(entries)) => entries,
            Ok(None) => anyhow::bail!("Directory not found: {}", path),
            Err(e) => anyhow::bail!("{}: {} ({})", dir, e, Errno::from_error(&e)),
        };

        for entry in entries {
            let is_dir = entry.stats.is_directory();
            let type_char = if is_dir { 'd' } else { 'f' };
            let full_path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", prefix, entry.name)
            };

            stdout
                .write_fmt(format_args!("{} {}\n", type_char, full_path))
                .context("Failed to write to stdout")?;

            if is_dir {
                queue.push_back(full_path);
            }
        }
    }

    Ok(())
}

pub async fn cat_filesystem(
    stdout: &mut impl std::io::Write,
    mounts: Vec<MountSpec>,
    path: &str,
) -> AnyhowResult<()> {
    let host = open_host(false, mounts)?;

    match host.fs().read_file(path).await {
        Ok(Some(file)) => {
            stdout.write_all(&file)?;
            Ok(())
        }
        Ok(None) => anyhow::bail!("File not found: {}", path),
        Err(e) => anyhow::bail!("{}: {} ({})", path, e, Errno::from_error(&e)),
    }
}
