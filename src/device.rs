//! The device-handle contract shared by every transport the driver can run on.

use std::time::Duration;

use crate::error::Result;
use crate::Settings;

/// A raw, point-in-time reading of the modem lines.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ControlSignals {
    /// Data Terminal Ready (output).
    pub dtr: bool,

    /// Request To Send (output).
    pub rts: bool,

    /// Data Set Ready (input).
    pub dsr: bool,

    /// Clear To Send (input).
    pub cts: bool,
}

/// One open connection to a byte-stream endpoint.
///
/// A `Device` is owned by exactly one driver and shared only with that driver's receive thread,
/// so every method takes `&self`. The receive thread calls `wait_readable()` and
/// `read_nonblocking()`; every other method is called from the owner's side.
pub trait Device: Send + Sync + 'static {
    /// Applies line settings in raw mode.
    ///
    /// ## Errors
    ///
    /// * `UnsupportedOperation` if the settings cannot be expressed on this transport.
    /// * `OperationNotPermitted` if the current settings cannot be read or the new ones applied.
    fn configure(&self, settings: &Settings) -> Result<()>;

    /// Writes all of `buf`, retrying while the device would block. Returns the number of bytes
    /// written, which is always `buf.len()` on success.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Reads whatever is available into `buf` without blocking. Returns zero if nothing is
    /// available.
    fn read_nonblocking(&self, buf: &mut [u8]) -> Result<usize>;

    /// Waits up to `timeout` for the device to become readable. Returns `false` on timeout.
    fn wait_readable(&self, timeout: Duration) -> Result<bool>;

    /// Reads all four modem lines with a single query.
    fn control_signals(&self) -> Result<ControlSignals>;

    /// Updates DTR and RTS with one read-modify-write of the line bits. `None` leaves a line as
    /// it is.
    fn set_modem_lines(&self, dtr: Option<bool>, rts: Option<bool>) -> Result<()>;

    /// Releases the device. Calling it again is a no-op.
    fn close(&self);
}
