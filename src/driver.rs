//! The serial driver: one device, one receive ring, one receive thread.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info};

use crate::device::{ControlSignals, Device};
use crate::error::{Error, Result};
use crate::receiver::{self, ReceiveHealth, ReceiveOptions, ReceiveStats};
use crate::ring::{CursorTracker, ReceiveBuffer, Received, RingBuffer};
use crate::{ModemControl, Serial, Settings};

#[cfg(unix)]
use crate::posix::TTYPort;

/// State shared between a driver and its receive thread.
struct Shared<D> {
    device: D,
    ring: RingBuffer,
    stop: AtomicBool,
    health: ReceiveHealth,
}

/// A serial port backed by a background receive thread.
///
/// Created behind an `Arc` and never moved: the receive thread and any pins acquired from the
/// driver refer to the same instance. Dropping the last reference stops the receive thread,
/// waits for it to exit, and only then closes the device.
pub struct SerialDriver<D: Device> {
    shared: Arc<Shared<D>>,
    receiver: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl SerialDriver<TTYPort> {
    /// Opens the TTY at `path`, applies `settings`, and starts receiving into a ring of
    /// `capacity` bytes.
    ///
    /// ## Errors
    ///
    /// * `InvalidArgument` if `capacity` is zero. The device is not opened.
    /// * `DeviceNotFound`, `PermissionDenied` or `OperationNotPermitted` if the device cannot be
    ///   opened.
    /// * Any error from `configure()`.
    pub fn open(path: &Path, capacity: usize, settings: &Settings) -> Result<Arc<Self>> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("receive buffer capacity must be non-zero"));
        }

        let device = TTYPort::open(path)?;
        SerialDriver::with_device(device, capacity, settings)
    }
}

impl<D: Device> SerialDriver<D> {
    /// Takes ownership of an already-open `device` and starts receiving from it with the default
    /// receive options.
    ///
    /// On error the device is closed and nothing keeps running.
    pub fn with_device(device: D, capacity: usize, settings: &Settings) -> Result<Arc<Self>> {
        SerialDriver::with_options(device, capacity, settings, ReceiveOptions::default())
    }

    /// Like `with_device()`, with explicit receive options.
    pub fn with_options(
        device: D,
        capacity: usize,
        settings: &Settings,
        options: ReceiveOptions,
    ) -> Result<Arc<Self>> {
        let ring = match options.validate().and_then(|()| RingBuffer::new(capacity)) {
            Ok(ring) => ring,
            Err(err) => {
                device.close();
                return Err(err);
            }
        };

        if let Err(err) = device.configure(settings) {
            device.close();
            return Err(err);
        }

        let shared = Arc::new(Shared {
            device,
            ring,
            stop: AtomicBool::new(false),
            health: ReceiveHealth::default(),
        });

        let thread_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("serial-rx".to_string())
            .spawn(move || {
                let shared = &*thread_shared;
                receiver::receive_loop(&shared.device, &shared.ring, &shared.stop, &shared.health, &options);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                shared.device.close();
                return Err(Error::Io(err));
            }
        };

        info!("receive thread started ({} byte ring)", capacity);

        Ok(Arc::new(SerialDriver {
            shared,
            receiver: Some(handle),
        }))
    }

    /// The underlying device.
    pub fn device(&self) -> &D {
        &self.shared.device
    }

    /// Size of the receive ring in bytes.
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Receive buffer and cursor taken together.
    pub fn receive_snapshot(&self) -> (ReceiveBuffer<'_>, usize) {
        self.shared.ring.snapshot()
    }

    /// Counters kept by the receive thread.
    pub fn receive_stats(&self) -> ReceiveStats {
        self.shared.health.stats(&self.shared.ring)
    }

    /// Appends everything received since `tracker`'s last read to `out` and advances the
    /// tracker. `tracker` must come from `tracker()` on this driver.
    ///
    /// Exactly one ring's worth of new data is returned in full. More than that sets `overrun`
    /// and returns only the newest ring's worth.
    pub fn read_since(&self, tracker: &mut CursorTracker, out: &mut Vec<u8>) -> Received {
        let (buffer, total) = self.shared.ring.snapshot_total();
        tracker.read_total(buffer, total, out)
    }

    /// A tracker positioned at the current write position, so only data arriving from now on
    /// is read.
    pub fn tracker(&self) -> CursorTracker {
        CursorTracker::from_total(self.shared.ring.total(), self.shared.ring.capacity())
    }
}

impl<D: Device> Serial for SerialDriver<D> {
    fn configure(&self, settings: &Settings) -> Result<()> {
        self.shared.device.configure(settings)
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.shared.device.write(data).map(|_| ())
    }

    fn receive_buffer(&self) -> ReceiveBuffer<'_> {
        self.shared.ring.buffer()
    }

    fn receive_cursor(&self) -> usize {
        self.shared.ring.cursor()
    }
}

impl<D: Device> ModemControl for SerialDriver<D> {
    fn set_dtr(&self, level: bool) -> Result<()> {
        self.shared.device.set_modem_lines(Some(level), None)
    }

    fn set_rts(&self, level: bool) -> Result<()> {
        self.shared.device.set_modem_lines(None, Some(level))
    }

    fn set_control_signals(&self, dtr: bool, rts: bool) -> Result<()> {
        self.shared.device.set_modem_lines(Some(dtr), Some(rts))
    }

    fn control_signals(&self) -> Result<ControlSignals> {
        self.shared.device.control_signals()
    }
}

impl<D: Device> Drop for SerialDriver<D> {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);

        if let Some(handle) = self.receiver.take() {
            if handle.join().is_err() {
                error!("receive thread panicked");
            }
        }

        // the receive thread has exited, so nothing else touches the device
        self.shared.device.close();

        info!("receive thread stopped");
    }
}

impl<D: Device + fmt::Debug> fmt::Debug for SerialDriver<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SerialDriver")
            .field("device", &self.shared.device)
            .field("ring", &self.shared.ring)
            .finish()
    }
}
