use std::io;
use std::path::PathBuf;

/// A type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of errors that can occur when driving a serial device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An argument was outside of its valid domain, e.g., a zero-sized receive buffer.
    InvalidArgument,

    /// The device path does not exist.
    DeviceNotFound,

    /// The operating system refused access to the device.
    PermissionDenied,

    /// A terminal or modem-control call was rejected by the operating system.
    OperationNotPermitted,

    /// The requested configuration cannot be expressed on this transport.
    UnsupportedOperation,

    /// Writing to the device failed.
    Io(io::ErrorKind),
}

/// An error returned by a serial driver, a device handle, or a pin adapter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("no such device: {}", .path.display())]
    DeviceNotFound { path: PathBuf },

    #[error("permission denied: {0}")]
    PermissionDenied(#[source] io::Error),

    #[error("operation not permitted: {0}")]
    OperationNotPermitted(#[source] io::Error),

    #[error("operation not supported: {0}")]
    UnsupportedOperation(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns the category of the error.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::OperationNotPermitted(_) => ErrorKind::OperationNotPermitted,
            Error::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Error::Io(ref err) => ErrorKind::Io(err.kind()),
        }
    }
}

/// Classifies a failed `open()` of `path`.
pub fn from_open_error(path: PathBuf, err: io::Error) -> Error {
    use libc::{EACCES, ENOENT, EPERM};

    match err.raw_os_error() {
        Some(ENOENT) => Error::DeviceNotFound { path },
        Some(EACCES) | Some(EPERM) => Error::PermissionDenied(err),
        _ => Error::OperationNotPermitted(err),
    }
}

/// Classifies a failed terminal-attribute or modem-control call.
pub fn from_control_error(err: io::Error) -> Error {
    Error::OperationNotPermitted(err)
}

pub fn last_os_error() -> io::Error {
    io::Error::last_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enoent_is_device_not_found() {
        let err = from_open_error(PathBuf::from("/dev/nope"), io::Error::from_raw_os_error(libc::ENOENT));
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
        assert_eq!(err.to_string(), "no such device: /dev/nope");
    }

    #[test]
    fn eacces_is_permission_denied() {
        let err = from_open_error(PathBuf::from("/dev/ttyS0"), io::Error::from_raw_os_error(libc::EACCES));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn ebusy_is_operation_not_permitted() {
        let err = from_open_error(PathBuf::from("/dev/ttyS0"), io::Error::from_raw_os_error(libc::EBUSY));
        assert_eq!(err.kind(), ErrorKind::OperationNotPermitted);
    }

    #[test]
    fn io_error_keeps_its_kind() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(err.kind(), ErrorKind::Io(io::ErrorKind::BrokenPipe));
    }
}
