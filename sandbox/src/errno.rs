//! Error codes returned to the guest.
//!
//! The numbering is the WASI preview1 `errno` table; guest toolchains compile
//! these values in, so they never change.

use hostabi_sdk::FsError;
use thiserror::Error;

use crate::clock::ClockError;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Errno {
    #[error("ESUCCESS")]
    Success = 0,
    #[error("EACCES")]
    Acces = 2,
    #[error("EBADF")]
    Badf = 8,
    #[error("EEXIST")]
    Exist = 20,
    #[error("EFAULT")]
    Fault = 21,
    #[error("EINVAL")]
    Inval = 28,
    #[error("EIO")]
    Io = 29,
    #[error("EISDIR")]
    Isdir = 31,
    #[error("ENAMETOOLONG")]
    Nametoolong = 37,
    #[error("ENOENT")]
    Noent = 44,
    #[error("ENOSYS")]
    Nosys = 52,
    #[error("ENOTDIR")]
    Notdir = 54,
    #[error("ENOTSUP")]
    Notsup = 58,
    #[error("EPERM")]
    Perm = 63,
    #[error("ENOTCAPABLE")]
    Notcapable = 76,
}

impl Errno {
    const ALL: [Errno; 15] = [
        Errno::Success,
        Errno::Acces,
        Errno::Badf,
        Errno::Exist,
        Errno::Fault,
        Errno::Inval,
        Errno::Io,
        Errno::Isdir,
        Errno::Nametoolong,
        Errno::Noent,
        Errno::Nosys,
        Errno::Notdir,
        Errno::Notsup,
        Errno::Perm,
        Errno::Notcapable,
    ];

    /// The value written to the guest.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Symbolic name used in diagnostics, e.g. `EFAULT`.
    pub fn name(self) -> &'static str {
        match self {
            Errno::Success => "ESUCCESS",
            Errno::Acces => "EACCES",
            Errno::Badf => "EBADF",
            Errno::Exist => "EEXIST",
            Errno::Fault => "EFAULT",
            Errno::Inval => "EINVAL",
            Errno::Io => "EIO",
            Errno::Isdir => "EISDIR",
            Errno::Nametoolong => "ENAMETOOLONG",
            Errno::Noent => "ENOENT",
            Errno::Nosys => "ENOSYS",
            Errno::Notdir => "ENOTDIR",
            Errno::Notsup => "ENOTSUP",
            Errno::Perm => "EPERM",
            Errno::Notcapable => "ENOTCAPABLE",
        }
    }

    pub fn from_code(code: u16) -> Option<Errno> {
        Self::ALL.into_iter().find(|e| e.code() == code)
    }

    /// Map a backing-store error to the code the guest sees.
    ///
    /// `FsError` values keep their meaning; host I/O errors are mapped by
    /// kind and anything else is `EIO`.
    pub fn from_error(err: &anyhow::Error) -> Errno {
        if let Some(fs) = FsError::of(err) {
            return fs.into();
        }
        match err.downcast_ref::<std::io::Error>() {
            Some(io) => io.into(),
            None => Errno::Io,
        }
    }
}

impl From<FsError> for Errno {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => Errno::Noent,
            FsError::NotADirectory => Errno::Notdir,
            FsError::IsADirectory => Errno::Isdir,
            FsError::InvalidPath => Errno::Inval,
        }
    }
}

impl From<ClockError> for Errno {
    fn from(err: ClockError) -> Self {
        match err {
            ClockError::Unsupported(_) => Errno::Inval,
        }
    }
}

impl From<&std::io::Error> for Errno {
    fn from(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Errno::Noent,
            ErrorKind::PermissionDenied => Errno::Acces,
            ErrorKind::AlreadyExists => Errno::Exist,
            ErrorKind::InvalidInput => Errno::Inval,
            ErrorKind::Unsupported => Errno::Notsup,
            _ => match err.raw_os_error() {
                Some(libc::ENOTDIR) => Errno::Notdir,
                Some(libc::EISDIR) => Errno::Isdir,
                Some(libc::ENAMETOOLONG) => Errno::Nametoolong,
                Some(libc::EPERM) => Errno::Perm,
                _ => Errno::Io,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_codes() {
        assert_eq!(Errno::Success.code(), 0);
        assert_eq!(Errno::Fault.code(), 21);
        assert_eq!(Errno::Inval.code(), 28);
        assert_eq!(Errno::Notsup.code(), 58);
        assert_eq!(Errno::Noent.code(), 44);
    }

    #[test]
    fn test_names_match_display() {
        for errno in Errno::ALL {
            assert_eq!(errno.to_string(), errno.name());
            assert_eq!(Errno::from_code(errno.code()), Some(errno));
        }
        assert_eq!(Errno::from_code(1), None);
        assert_eq!(Errno::from_code(u16::MAX), None);
    }

    #[test]
    fn test_internal_kinds_map_to_one_code() {
        assert_eq!(Errno::from(FsError::NotFound), Errno::Noent);
        assert_eq!(Errno::from(FsError::NotADirectory), Errno::Notdir);
        assert_eq!(Errno::from(FsError::IsADirectory), Errno::Isdir);
        assert_eq!(Errno::from(FsError::InvalidPath), Errno::Inval);
        assert_eq!(Errno::from(ClockError::Unsupported(2)), Errno::Inval);
    }

    #[test]
    fn test_from_error() {
        let err: anyhow::Error = FsError::NotFound.into();
        assert_eq!(Errno::from_error(&err), Errno::Noent);

        let err: anyhow::Error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(Errno::from_error(&err), Errno::Acces);

        let err: anyhow::Error = std::io::Error::from_raw_os_error(libc::ENOTDIR).into();
        assert_eq!(Errno::from_error(&err), Errno::Notdir);

        assert_eq!(Errno::from_error(&anyhow::anyhow!("opaque")), Errno::Io);
    }
}
