//! The background loop that moves bytes from a device into a receive ring.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::device::Device;
use crate::error::{Error, ErrorKind, Result};
use crate::ring::RingBuffer;

/// Default upper bound on a single readability wait. Shutdown completes within about this long.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Default size of the staging chunk for one non-blocking read.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Tuning for a driver's receive thread.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Longest time the thread blocks waiting for data before checking for shutdown.
    pub poll_timeout: Duration,

    /// Most bytes pulled from the device per read.
    pub chunk_size: usize,
}

impl ReceiveOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidArgument("receive chunk size must be non-zero"));
        }

        Ok(())
    }
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        ReceiveOptions {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Point-in-time counters describing the receive thread.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// Bytes written into the ring since the driver started. Grows past the ring's capacity.
    pub bytes_received: u64,

    /// Failed waits or reads. The thread keeps running after each one.
    pub read_errors: u64,

    /// Category of the most recent failure, if any.
    pub last_error: Option<ErrorKind>,
}

/// Error counters updated by the receive thread and read by anyone.
#[derive(Debug, Default)]
pub struct ReceiveHealth {
    read_errors: AtomicU64,
    failing: AtomicBool,
    last_error: Mutex<Option<ErrorKind>>,
}

impl ReceiveHealth {
    /// Counters together with the total taken from `ring`.
    pub fn stats(&self, ring: &RingBuffer) -> ReceiveStats {
        ReceiveStats {
            bytes_received: ring.total(),
            read_errors: self.read_errors.load(Ordering::Acquire),
            last_error: *self.last_error.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    fn record_success(&self) {
        self.failing.store(false, Ordering::Relaxed);
    }

    fn record_error(&self, err: &Error) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.kind());
        self.read_errors.fetch_add(1, Ordering::Release);

        if !self.failing.swap(true, Ordering::Relaxed) {
            warn!("receive failed: {}", err);
        } else {
            debug!("receive failed again: {}", err);
        }
    }
}

/// Runs until `stop` is set: waits for `device` to become readable, reads one chunk, and appends
/// it to `ring`, publishing the cursor once per chunk.
///
/// Errors never end the loop. They are counted in `health` and followed by a pause of one poll
/// interval so a broken device doesn't spin the thread.
pub fn receive_loop<D: Device + ?Sized>(
    device: &D,
    ring: &RingBuffer,
    stop: &AtomicBool,
    health: &ReceiveHealth,
    options: &ReceiveOptions,
) {
    let mut chunk = vec![0u8; options.chunk_size];

    while !stop.load(Ordering::Acquire) {
        match device.wait_readable(options.poll_timeout) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => {
                health.record_error(&err);
                thread::sleep(options.poll_timeout);
                continue;
            }
        }

        match device.read_nonblocking(&mut chunk) {
            Ok(0) => {
                // readable with nothing to read: end of input on this device
                thread::sleep(options.poll_timeout);
            }
            Ok(len) => {
                let cursor = ring.write_region(&chunk[..len]);
                health.record_success();
                trace!("received {} bytes, cursor at {}", len, cursor);
            }
            Err(err) => {
                health.record_error(&err);
                thread::sleep(options.poll_timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Instant;

    use crate::loopback::LoopbackDevice;

    fn fast() -> ReceiveOptions {
        ReceiveOptions {
            poll_timeout: Duration::from_millis(10),
            chunk_size: 4,
        }
    }

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn options_reject_zero_chunk() {
        let options = ReceiveOptions { chunk_size: 0, ..Default::default() };
        assert_eq!(options.validate().unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn loop_copies_chunks_into_ring() {
        let device = Arc::new(LoopbackDevice::new());
        let ring = Arc::new(RingBuffer::new(32).unwrap());
        let stop = Arc::new(AtomicBool::new(false));
        let health = Arc::new(ReceiveHealth::default());

        let handle = {
            let (device, ring, stop, health) = (device.clone(), ring.clone(), stop.clone(), health.clone());
            thread::spawn(move || receive_loop(&*device, &ring, &stop, &health, &fast()))
        };

        device.inject(b"0123456789");
        assert!(wait_for(|| ring.cursor() == 10));

        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        assert_eq!(&ring.buffer().to_vec()[..10], b"0123456789");
        assert_eq!(health.stats(&ring).bytes_received, 10);
        assert_eq!(health.stats(&ring).read_errors, 0);
    }

    #[test]
    fn loop_counts_errors_and_keeps_running() {
        let device = Arc::new(LoopbackDevice::new());
        let ring = Arc::new(RingBuffer::new(32).unwrap());
        let stop = Arc::new(AtomicBool::new(false));
        let health = Arc::new(ReceiveHealth::default());

        device.fail_reads(true);

        let handle = {
            let (device, ring, stop, health) = (device.clone(), ring.clone(), stop.clone(), health.clone());
            thread::spawn(move || receive_loop(&*device, &ring, &stop, &health, &fast()))
        };

        device.inject(b"ab");
        assert!(wait_for(|| health.stats(&ring).read_errors > 0));
        assert_eq!(health.stats(&ring).last_error, Some(ErrorKind::Io(std::io::ErrorKind::Other)));

        device.fail_reads(false);
        assert!(wait_for(|| ring.cursor() == 2));

        stop.store(true, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn loop_exits_promptly_after_stop() {
        let device = Arc::new(LoopbackDevice::new());
        let ring = Arc::new(RingBuffer::new(8).unwrap());
        let stop = Arc::new(AtomicBool::new(false));
        let health = Arc::new(ReceiveHealth::default());

        let handle = {
            let (device, ring, stop, health) = (device.clone(), ring.clone(), stop.clone(), health.clone());
            thread::spawn(move || receive_loop(&*device, &ring, &stop, &health, &fast()))
        };

        thread::sleep(Duration::from_millis(30));

        let start = Instant::now();
        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
