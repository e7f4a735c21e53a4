//! A serial device backed by the process's standard input and output.
//!
//! Useful for trying out code written against `Serial` without hardware: received data is read
//! from stdin (or another descriptor) and written data goes to stdout. There are no modem lines
//! and line settings are ignored.

use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use libc::{c_void, size_t, STDIN_FILENO};
use log::debug;

use crate::device::{ControlSignals, Device};
use crate::driver::SerialDriver;
use crate::error::{Error, Result};
use crate::posix::poll;
use crate::Settings;

/// Smallest receive ring a console driver is created with.
pub const MIN_CONSOLE_BUFFER: usize = 32;

/// Standard input and output as a serial device.
#[derive(Debug)]
pub struct ConsoleDevice {
    input: RawFd,
    closed: AtomicBool,
}

impl ConsoleDevice {
    pub fn new() -> Self {
        ConsoleDevice::with_input(STDIN_FILENO)
    }

    /// Reads from `input` instead of stdin. The descriptor stays owned by the caller and must
    /// outlive the device.
    pub fn with_input(input: RawFd) -> Self {
        ConsoleDevice {
            input,
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for ConsoleDevice {
    fn default() -> Self {
        ConsoleDevice::new()
    }
}

/// Starts a driver on the console with a receive ring of at least `MIN_CONSOLE_BUFFER` bytes.
pub fn console(capacity: usize) -> Result<Arc<SerialDriver<ConsoleDevice>>> {
    start(ConsoleDevice::new(), capacity)
}

fn start(device: ConsoleDevice, capacity: usize) -> Result<Arc<SerialDriver<ConsoleDevice>>> {
    SerialDriver::with_device(device, capacity.max(MIN_CONSOLE_BUFFER), &Settings::default())
}

impl Device for ConsoleDevice {
    fn configure(&self, settings: &Settings) -> Result<()> {
        debug!("console ignores settings {:?}", settings);
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();

        stdout.write_all(buf)?;
        stdout.flush()?;

        Ok(buf.len())
    }

    fn read_nonblocking(&self, buf: &mut [u8]) -> Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(0);
        }

        let len = unsafe { libc::read(self.input, buf.as_mut_ptr() as *mut c_void, buf.len() as size_t) };

        if len >= 0 {
            return Ok(len as usize);
        }

        let err = io::Error::last_os_error();

        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(0),
            _ => Err(Error::Io(err)),
        }
    }

    fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        match poll::wait_read_fd(self.input, timeout) {
            Ok(()) => Ok(true),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn control_signals(&self) -> Result<ControlSignals> {
        Err(Error::UnsupportedOperation("the console has no modem lines"))
    }

    fn set_modem_lines(&self, _dtr: Option<bool>, _rts: Option<bool>) -> Result<()> {
        Err(Error::UnsupportedOperation("the console has no modem lines"))
    }

    fn close(&self) {
        // the descriptors belong to the process and stay open
        self.closed.store(true, Ordering::Release);
    }
}
