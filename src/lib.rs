//! Serial port driver with a background receive pipeline.
//!
//! A [`SerialDriver`](driver/struct.SerialDriver.html) owns one open device and one receive
//! thread. The thread continuously copies incoming bytes into a fixed-capacity ring buffer and
//! publishes a cursor; callers read the ring without locking by comparing cursor values. DTR and
//! RTS can be driven directly or through generic output pins that share the driver.
//!
//! ```no_run
//! use serial_hal::prelude::*;
//!
//! let port = serial_hal::open("/dev/ttyUSB0", 1024, &serial_hal::Settings::default()).unwrap();
//! let mut tracker = serial_hal::CursorTracker::new(port.receive_cursor());
//!
//! port.write(b"hello\n").unwrap();
//!
//! let mut received = Vec::new();
//! tracker.read_new(port.receive_buffer(), port.receive_cursor(), &mut received);
//! ```

use std::path::Path;
use std::sync::Arc;

pub use BaudRate::*;
pub use Parity::*;
pub use StopBits::*;

pub use crate::clock::MonotonicClock;
pub use crate::device::{ControlSignals, Device};
pub use crate::driver::SerialDriver;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::loopback::LoopbackDevice;
pub use crate::pin::{acquire_input_pin, acquire_output_pin, ModemIn, ModemInputPin, ModemOut, ModemOutputPin};
pub use crate::receiver::{ReceiveOptions, ReceiveStats};
pub use crate::ring::{CursorTracker, ReceiveBuffer, Received, RingBuffer};

#[cfg(unix)]
pub use crate::console::{console, ConsoleDevice, MIN_CONSOLE_BUFFER};
#[cfg(unix)]
pub use crate::posix::TTYPort;

/// A module that exports traits that are useful to have in scope.
///
/// It is intended to be glob imported:
///
/// ```no_run
/// use serial_hal::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{InputPin, ModemControl, OutputPin, Serial, SteadyClock};
}

pub mod clock;
#[cfg(unix)]
pub mod console;
pub mod device;
pub mod driver;
pub mod error;
pub mod loopback;
pub mod pin;
pub mod receiver;
pub mod ring;

#[cfg(unix)]
pub mod posix;

/// Opens a TTY device and starts its receive thread.
///
/// `capacity` is the size of the receive ring in bytes.
///
/// ## Errors
///
/// * `InvalidArgument` if `capacity` is zero. The device is not opened.
/// * `DeviceNotFound` if `path` does not exist.
/// * `PermissionDenied` or `OperationNotPermitted` if the device cannot be opened or configured.
/// * `UnsupportedOperation` if `settings` cannot be applied.
#[cfg(unix)]
pub fn open<T: AsRef<Path> + ?Sized>(
    path: &T,
    capacity: usize,
    settings: &Settings,
) -> Result<Arc<SerialDriver<TTYPort>>> {
    SerialDriver::open(path.as_ref(), capacity, settings)
}

/// Standard serial baud rates.
///
/// Any other rate is rejected by `configure()` as unsupported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BaudRate {
    /** 50 baud. */      Baud50,
    /** 75 baud. */      Baud75,
    /** 110 baud. */     Baud110,
    /** 134 baud. */     Baud134,
    /** 150 baud. */     Baud150,
    /** 200 baud. */     Baud200,
    /** 300 baud. */     Baud300,
    /** 600 baud. */     Baud600,
    /** 1200 baud. */    Baud1200,
    /** 1800 baud. */    Baud1800,
    /** 2400 baud. */    Baud2400,
    /** 4800 baud. */    Baud4800,
    /** 9600 baud. */    Baud9600,
    /** 19,200 baud. */  Baud19200,
    /** 38,400 baud. */  Baud38400,
    /** 57,600 baud. */  Baud57600,
    /** 115,200 baud. */ Baud115200,
    /** 230,400 baud. */ Baud230400,
}

impl BaudRate {
    /// Looks up the standard rate for a numeric baud rate.
    pub fn from_speed(speed: u32) -> Option<BaudRate> {
        let baud = match speed {
            50 => Baud50,
            75 => Baud75,
            110 => Baud110,
            134 => Baud134,
            150 => Baud150,
            200 => Baud200,
            300 => Baud300,
            600 => Baud600,
            1200 => Baud1200,
            1800 => Baud1800,
            2400 => Baud2400,
            4800 => Baud4800,
            9600 => Baud9600,
            19200 => Baud19200,
            38400 => Baud38400,
            57600 => Baud57600,
            115200 => Baud115200,
            230400 => Baud230400,
            _ => return None,
        };

        Some(baud)
    }
}

/// Parity checking modes.
///
/// When parity checking is enabled (`ParityOdd` or `ParityEven`) an extra bit is transmitted with
/// each character. The value of the parity bit is arranged so that the number of 1 bits in the
/// character (including the parity bit) is an even number (`ParityEven`) or an odd number
/// (`ParityOdd`). The forced modes transmit a constant parity bit and are not available on TTY
/// devices.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit.
    ParityNone,

    /// Parity bit sets even number of 1 bits.
    ParityEven,

    /// Parity bit sets odd number of 1 bits.
    ParityOdd,

    /// Parity bit is always 1.
    ParityForced1,

    /// Parity bit is always 0.
    ParityForced0,
}

/// Number of stop bits.
///
/// Stop bits are transmitted after every character.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopBits {
    /// One stop bit.
    Stop1,

    /// Two stop bits.
    Stop2,
}

/// Line settings for a serial device. Characters are always 8 bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Numeric baud rate, e.g. `115200`.
    pub baud_rate: u32,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Parity checking mode.
    pub parity: Parity,
}

impl Settings {
    pub fn new(baud_rate: u32) -> Self {
        Settings {
            baud_rate,
            ..Default::default()
        }
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            baud_rate: 115200,
            stop_bits: StopBits::Stop1,
            parity: Parity::ParityNone,
        }
    }
}

/// A byte-stream serial port with a cursor-addressed receive buffer.
///
/// Received data is exposed as a circular log. Callers remember the cursor from their previous
/// read and treat everything between it and the current cursor as new; a smaller cursor than
/// before means the log wrapped once.
pub trait Serial {
    /// Applies new line settings.
    ///
    /// ## Errors
    ///
    /// * `UnsupportedOperation` if the baud rate is not a standard rate or the parity mode is
    ///   not available.
    /// * `OperationNotPermitted` if the settings could not be applied.
    fn configure(&self, settings: &Settings) -> Result<()>;

    /// Writes all of `data`, blocking until the operating system has accepted every byte.
    fn write(&self, data: &[u8]) -> Result<()>;

    /// The whole receive buffer.
    fn receive_buffer(&self) -> ReceiveBuffer<'_>;

    /// Index of the next byte the receiver will write.
    fn receive_cursor(&self) -> usize;
}

/// Direct control of the modem handshake lines.
pub trait ModemControl {
    /// Sets the DTR (Data Terminal Ready) line.
    fn set_dtr(&self, level: bool) -> Result<()>;

    /// Sets the RTS (Request To Send) line.
    fn set_rts(&self, level: bool) -> Result<()>;

    /// Sets DTR and RTS together with a single update.
    fn set_control_signals(&self, dtr: bool, rts: bool) -> Result<()>;

    /// Reads DTR, RTS, DSR and CTS fresh from the device.
    fn control_signals(&self) -> Result<ControlSignals>;
}

/// Pull resistor requested for a pin.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinResistor {
    None,
    PullUp,
    PullDown,
}

impl Default for PinResistor {
    fn default() -> Self {
        PinResistor::None
    }
}

/// Electrical settings requested for a digital pin.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PinSettings {
    pub resistor: PinResistor,
    pub open_drain: bool,
}

/// A digital output pin.
pub trait OutputPin {
    /// Applies electrical settings. Settings that the pin cannot honor are errors; settings it
    /// has no control over may be accepted without effect.
    fn configure(&self, settings: &PinSettings) -> Result<()>;

    /// Drives the pin high (`true`) or low (`false`).
    fn set_level(&self, high: bool) -> Result<()>;

    /// Reads the pin's current level.
    fn level(&self) -> Result<bool>;
}

/// A digital input pin.
pub trait InputPin {
    fn configure(&self, settings: &PinSettings) -> Result<()>;

    fn level(&self) -> Result<bool>;
}

/// A monotonic time source.
pub trait SteadyClock {
    /// Tick rate of `uptime()` in hertz.
    fn frequency(&self) -> u64;

    /// Ticks elapsed since the clock was created. Never decreases.
    fn uptime(&self) -> u64;
}
