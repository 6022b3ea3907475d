pub mod cmd;
pub mod parser;

use anyhow::{Context, Result};

/// Runtime for the async filesystem commands.
pub fn get_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}
