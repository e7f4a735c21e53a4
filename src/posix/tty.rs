use std::ffi::CString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use std::os::unix::prelude::*;

use ioctl_rs as ioctl;
use libc::{c_int, c_void, size_t};
use libc::{TIOCM_CTS, TIOCM_DSR, TIOCM_DTR, TIOCM_RTS};
use log::{debug, info, warn};

use crate::device::{ControlSignals, Device};
use crate::error::{self, Error, Result};
use crate::{BaudRate, Parity, Settings, StopBits};

use super::poll;

/// How long `write()` waits for room in the output queue before trying again.
const WRITE_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// A TTY-based serial device.
///
/// The device is opened non-blocking, without becoming the controlling terminal, and locked for
/// exclusive use. It is closed when the value is dropped.
#[derive(Debug)]
pub struct TTYPort {
    fd: RawFd,
    path: PathBuf,
    closed: AtomicBool,
}

impl TTYPort {
    /// Opens a TTY device.
    ///
    /// `path` should be the path to a TTY device, e.g., `/dev/ttyS0`.
    ///
    /// ```no_run
    /// use std::path::Path;
    ///
    /// serial_hal::TTYPort::open(Path::new("/dev/ttyS0")).unwrap();
    /// ```
    ///
    /// ## Errors
    ///
    /// * `DeviceNotFound` if `path` does not exist.
    /// * `PermissionDenied` if the caller may not open the device.
    /// * `OperationNotPermitted` for any other failure, e.g., the device is already in exclusive
    ///   use.
    /// * `InvalidArgument` if `path` contains a NUL byte.
    pub fn open(path: &Path) -> Result<Self> {
        use libc::{O_NOCTTY, O_NONBLOCK, O_RDWR};

        let cstr = match CString::new(path.as_os_str().as_bytes()) {
            Ok(s) => s,
            Err(_) => return Err(Error::InvalidArgument("device path contains a NUL byte")),
        };

        let fd = unsafe { libc::open(cstr.as_ptr(), O_RDWR | O_NOCTTY | O_NONBLOCK, 0) };
        if fd < 0 {
            return Err(error::from_open_error(path.to_path_buf(), error::last_os_error()));
        }

        // get exclusive access to device
        if let Err(err) = ioctl::tiocexcl(fd) {
            unsafe {
                libc::close(fd);
            }
            return Err(error::from_control_error(err));
        }

        info!("opened {}", path.display());

        Ok(TTYPort {
            fd,
            path: path.to_path_buf(),
            closed: AtomicBool::new(false),
        })
    }

    /// Path the device was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn modem_bits(&self) -> Result<c_int> {
        ioctl::tiocmget(self.fd).map_err(error::from_control_error)
    }
}

impl Drop for TTYPort {
    fn drop(&mut self) {
        self.close();
    }
}

impl AsRawFd for TTYPort {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Device for TTYPort {
    fn configure(&self, settings: &Settings) -> Result<()> {
        use termios::{tcsetattr, Termios, TCSANOW};

        let mut termios = Termios::from_fd(self.fd).map_err(error::from_control_error)?;
        apply_settings(&mut termios, settings)?;

        // write settings to TTY
        tcsetattr(self.fd, TCSANOW, &termios).map_err(error::from_control_error)?;

        debug!("configured {}: {:?}", self.path.display(), settings);
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut written = 0;

        while written < buf.len() {
            let remaining = &buf[written..];
            let len = unsafe {
                libc::write(self.fd, remaining.as_ptr() as *const c_void, remaining.len() as size_t)
            };

            if len < 0 {
                let err = io::Error::last_os_error();

                match err.kind() {
                    io::ErrorKind::WouldBlock => match poll::wait_write_fd(self.fd, WRITE_POLL_TIMEOUT) {
                        Ok(()) => continue,
                        Err(ref e) if e.kind() == io::ErrorKind::TimedOut => continue,
                        Err(e) => return Err(Error::Io(e)),
                    },
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(Error::Io(err)),
                }
            }

            written += len as usize;
        }

        Ok(written)
    }

    fn read_nonblocking(&self, buf: &mut [u8]) -> Result<usize> {
        let len = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut c_void, buf.len() as size_t) };

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
        match poll::wait_read_fd(self.fd, timeout) {
            Ok(()) => Ok(true),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn control_signals(&self) -> Result<ControlSignals> {
        self.modem_bits().map(signals_from_bits)
    }

    fn set_modem_lines(&self, dtr: Option<bool>, rts: Option<bool>) -> Result<()> {
        let bits = with_output_lines(self.modem_bits()?, dtr, rts);
        ioctl::tiocmset(self.fd, bits).map_err(error::from_control_error)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(err) = ioctl::tiocnxcl(self.fd) {
            warn!("failed to release exclusive access to {}: {}", self.path.display(), err);
        }

        unsafe {
            libc::close(self.fd);
        }

        info!("closed {}", self.path.display());
    }
}

fn signals_from_bits(bits: c_int) -> ControlSignals {
    ControlSignals {
        dtr: bits & TIOCM_DTR != 0,
        rts: bits & TIOCM_RTS != 0,
        dsr: bits & TIOCM_DSR != 0,
        cts: bits & TIOCM_CTS != 0,
    }
}

/// Sets or clears DTR and RTS in a TIOCMGET word, leaving every other bit alone.
fn with_output_lines(mut bits: c_int, dtr: Option<bool>, rts: Option<bool>) -> c_int {
    for &(pin, level) in &[(TIOCM_DTR, dtr), (TIOCM_RTS, rts)] {
        match level {
            Some(true) => bits |= pin,
            Some(false) => bits &= !pin,
            None => {}
        }
    }

    bits
}

/// Puts `termios` into raw 8-bit mode with the speed, stop bits and parity from `settings`.
fn apply_settings(termios: &mut termios::Termios, settings: &Settings) -> Result<()> {
    use termios::{cfmakeraw, cfsetspeed};
    use termios::{CLOCAL, CREAD, CS8, CSIZE, CSTOPB}; // cflags
    use termios::{IGNPAR, INPCK, PARENB, PARODD}; // parity
    use termios::{VMIN, VTIME};

    let speed = speed_for(settings.baud_rate)?;

    // setup TTY for binary serial port access
    cfmakeraw(termios);
    termios.c_cflag |= CREAD | CLOCAL;
    termios.c_cflag &= !CSIZE;
    termios.c_cflag |= CS8;

    termios.c_cc[VMIN] = 0;
    termios.c_cc[VTIME] = 0;

    cfsetspeed(termios, speed).map_err(error::from_control_error)?;

    match settings.stop_bits {
        StopBits::Stop1 => termios.c_cflag &= !CSTOPB,
        StopBits::Stop2 => termios.c_cflag |= CSTOPB,
    };

    match settings.parity {
        Parity::ParityNone => {
            termios.c_cflag &= !(PARENB | PARODD);
            termios.c_iflag &= !INPCK;
            termios.c_iflag |= IGNPAR;
        }
        Parity::ParityOdd => {
            termios.c_cflag |= PARENB | PARODD;
            termios.c_iflag |= INPCK;
            termios.c_iflag &= !IGNPAR;
        }
        Parity::ParityEven => {
            termios.c_cflag &= !PARODD;
            termios.c_cflag |= PARENB;
            termios.c_iflag |= INPCK;
            termios.c_iflag &= !IGNPAR;
        }
        Parity::ParityForced1 | Parity::ParityForced0 => {
            return Err(Error::UnsupportedOperation("forced parity is not available on TTY devices"));
        }
    };

    Ok(())
}

/// Maps a numeric baud rate to its termios speed constant.
fn speed_for(baud_rate: u32) -> Result<termios::speed_t> {
    use termios::os::target::{B115200, B230400, B57600};
    use termios::{
        B110, B1200, B134, B150, B1800, B19200, B200, B2400, B300, B38400, B4800, B50, B600, B75,
        B9600,
    };

    let baud = match BaudRate::from_speed(baud_rate) {
        Some(baud) => baud,
        None => return Err(Error::UnsupportedOperation("baud rate is not a standard rate")),
    };

    let speed = match baud {
        BaudRate::Baud50 => B50,
        BaudRate::Baud75 => B75,
        BaudRate::Baud110 => B110,
        BaudRate::Baud134 => B134,
        BaudRate::Baud150 => B150,
        BaudRate::Baud200 => B200,
        BaudRate::Baud300 => B300,
        BaudRate::Baud600 => B600,
        BaudRate::Baud1200 => B1200,
        BaudRate::Baud1800 => B1800,
        BaudRate::Baud2400 => B2400,
        BaudRate::Baud4800 => B4800,
        BaudRate::Baud9600 => B9600,
        BaudRate::Baud19200 => B19200,
        BaudRate::Baud38400 => B38400,
        BaudRate::Baud57600 => B57600,
        BaudRate::Baud115200 => B115200,
        BaudRate::Baud230400 => B230400,
    };

    Ok(speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::ErrorKind;
    use crate::{ParityEven, ParityForced0, ParityOdd, Stop2};

    use termios::{cfgetospeed, Termios};
    use termios::{CS8, CSIZE, CSTOPB, ICANON, INPCK, PARENB, PARODD};

    /// Attributes of a fresh pseudo-terminal, for checking the flag mapping without applying it.
    fn pty_termios() -> Termios {
        let fd = unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY) };
        assert!(fd >= 0);

        let termios = Termios::from_fd(fd);
        unsafe {
            libc::close(fd);
        }

        termios.unwrap()
    }

    #[test]
    fn modem_bits_map_to_signals() {
        let signals = signals_from_bits(TIOCM_DTR | TIOCM_CTS | libc::TIOCM_CAR);
        assert_eq!(signals, ControlSignals { dtr: true, rts: false, dsr: false, cts: true });

        let signals = signals_from_bits(TIOCM_RTS | TIOCM_DSR);
        assert_eq!(signals, ControlSignals { dtr: false, rts: true, dsr: true, cts: false });
    }

    #[test]
    fn output_lines_update_only_requested_bits() {
        let bits = TIOCM_DSR | TIOCM_RTS;

        assert_eq!(with_output_lines(bits, Some(true), None), bits | TIOCM_DTR);
        assert_eq!(with_output_lines(bits, None, Some(false)), TIOCM_DSR);
        assert_eq!(with_output_lines(bits, Some(true), Some(false)), TIOCM_DSR | TIOCM_DTR);
        assert_eq!(with_output_lines(bits, None, None), bits);
    }

    #[test]
    fn settings_map_to_raw_8n1() {
        let mut termios = pty_termios();
        apply_settings(&mut termios, &Settings::new(9600)).unwrap();

        assert_eq!(cfgetospeed(&termios), termios::B9600);
        assert_eq!(termios.c_cflag & CSIZE, CS8);
        assert_eq!(termios.c_cflag & (CSTOPB | PARENB | PARODD), 0);
        assert_eq!(termios.c_iflag & INPCK, 0);
        assert_eq!(termios.c_lflag & ICANON, 0);
    }

    #[test]
    fn parity_modes_map_to_termios_flags() {
        let mut termios = pty_termios();

        apply_settings(&mut termios, &Settings::default().with_parity(ParityOdd)).unwrap();
        assert_eq!(termios.c_cflag & (PARENB | PARODD), PARENB | PARODD);
        assert_ne!(termios.c_iflag & INPCK, 0);

        apply_settings(&mut termios, &Settings::default().with_parity(ParityEven).with_stop_bits(Stop2)).unwrap();
        assert_eq!(termios.c_cflag & (PARENB | PARODD), PARENB);
        assert_ne!(termios.c_cflag & CSTOPB, 0);

        let err = apply_settings(&mut termios, &Settings::default().with_parity(ParityForced0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn speed_for_maps_standard_rates() {
        assert_eq!(speed_for(9600).unwrap(), termios::B9600);
        assert_eq!(speed_for(38400).unwrap(), termios::B38400);
        assert_eq!(speed_for(115200).unwrap(), termios::os::target::B115200);
    }

    #[test]
    fn speed_for_rejects_nonstandard_rates() {
        for &rate in &[0, 1, 14400, 250000, 921600] {
            assert_eq!(speed_for(rate).unwrap_err().kind(), ErrorKind::UnsupportedOperation);
        }
    }

    #[test]
    fn open_missing_device_is_not_found() {
        let err = TTYPort::open(Path::new("/dev/serial-hal-does-not-exist")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    }

    #[test]
    fn open_path_with_nul_is_invalid() {
        let err = TTYPort::open(Path::new("/dev/tty\0S0")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
