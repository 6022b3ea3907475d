//! Error types for the hostabi SDK.

use thiserror::Error;

/// The main error type for the hostabi SDK.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem-specific error with errno semantics
    #[error(transparent)]
    Fs(#[from] crate::filesystem::FsError),

    /// Mount option that does not parse, or a guest path no lookup can reach
    #[error("invalid mount '{0}': expected <host-dir>[:<guest-path>] with a plain guest path")]
    InvalidMount(String),

    /// Two mounts normalize to the same guest path
    #[error("guest path '{0}' is mounted more than once")]
    DuplicateMount(String),

    /// Host side of a mount is missing or not a directory
    #[error("mount source is not a directory: {0}")]
    MountNotDirectory(String),
}

/// Result type alias using the SDK Error type.
pub type Result<T> = std::result::Result<T, Error>;
