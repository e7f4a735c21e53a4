//! In-process loopback device.
//!
//! Bytes written to a `LoopbackDevice` come back as received data, as if TX were wired to RX.
//! DSR and CTS are set by hand, and reads or control calls can be made to fail, so the whole
//! driver can be exercised without hardware. Clones share the same device.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::device::{ControlSignals, Device};
use crate::error::{Error, Result};
use crate::Settings;

/// A device that echoes its output back to its input.
#[derive(Clone, Debug, Default)]
pub struct LoopbackDevice {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    readable: Condvar,
    in_flight: AtomicUsize,
    fail_reads: AtomicBool,
    fail_control: AtomicBool,
    used_after_close: AtomicBool,
    closed_while_busy: AtomicBool,
}

#[derive(Debug, Default)]
struct State {
    input: VecDeque<u8>,
    written: Vec<u8>,
    no_echo: bool,
    signals: ControlSignals,
    settings: Option<Settings>,
    configure_count: usize,
    wait_delay: Option<Duration>,
    closed: bool,
}

impl LoopbackDevice {
    /// Creates a device whose writes are echoed back as input.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a device that records writes without echoing them.
    pub fn without_echo() -> Self {
        let device = LoopbackDevice::new();
        device.lock().no_echo = true;
        device
    }

    /// Queues `data` as if it had arrived on the line.
    pub fn inject(&self, data: &[u8]) {
        self.lock().input.extend(data);
        self.inner.readable.notify_all();
    }

    /// Everything written to the device so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Drives the DSR and CTS inputs.
    pub fn set_inputs(&self, dsr: bool, cts: bool) {
        let mut state = self.lock();
        state.signals.dsr = dsr;
        state.signals.cts = cts;
    }

    /// Settings from the most recent successful `configure()`.
    pub fn settings(&self) -> Option<Settings> {
        self.lock().settings
    }

    /// Number of successful `configure()` calls.
    pub fn configure_count(&self) -> usize {
        self.lock().configure_count
    }

    /// Makes every read fail with an I/O error while `fail` is set.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes `configure()` and modem-line calls fail while `fail` is set.
    pub fn fail_control(&self, fail: bool) {
        self.inner.fail_control.store(fail, Ordering::SeqCst);
    }

    /// Sleeps for `delay` at the start of every readability wait.
    pub fn delay_waits(&self, delay: Duration) {
        self.lock().wait_delay = Some(delay);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Whether any device call arrived after `close()`.
    pub fn used_after_close(&self) -> bool {
        self.inner.used_after_close.load(Ordering::SeqCst)
    }

    /// Whether `close()` ran while another call was still inside the device.
    pub fn closed_while_busy(&self) -> bool {
        self.inner.closed_while_busy.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self) -> Result<InFlight<'_>> {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(&self.inner.in_flight);

        if self.lock().closed {
            self.inner.used_after_close.store(true, Ordering::SeqCst);
            return Err(Error::Io(io::Error::new(io::ErrorKind::NotConnected, "device is closed")));
        }

        Ok(guard)
    }

    fn check_control(&self) -> Result<()> {
        if self.inner.fail_control.load(Ordering::SeqCst) {
            return Err(Error::OperationNotPermitted(io::Error::from_raw_os_error(libc::EPERM)));
        }

        Ok(())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> Drop for InFlight<'a> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Device for LoopbackDevice {
    fn configure(&self, settings: &Settings) -> Result<()> {
        let _guard = self.enter()?;
        self.check_control()?;

        let mut state = self.lock();
        state.settings = Some(*settings);
        state.configure_count += 1;
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let _guard = self.enter()?;

        let mut state = self.lock();
        state.written.extend_from_slice(buf);

        if !state.no_echo {
            state.input.extend(buf);
            self.inner.readable.notify_all();
        }

        Ok(buf.len())
    }

    fn read_nonblocking(&self, buf: &mut [u8]) -> Result<usize> {
        let _guard = self.enter()?;

        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "injected read failure")));
        }

        let mut state = self.lock();
        let len = state.input.len().min(buf.len());

        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..len)) {
            *slot = byte;
        }

        Ok(len)
    }

    fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        let _guard = self.enter()?;

        let delay = self.lock().wait_delay;
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let state = self.lock();
        let (state, _) = self
            .inner
            .readable
            .wait_timeout_while(state, timeout, |state| state.input.is_empty() && !state.closed)
            .unwrap_or_else(|e| e.into_inner());

        Ok(!state.input.is_empty())
    }

    fn control_signals(&self) -> Result<ControlSignals> {
        let _guard = self.enter()?;
        self.check_control()?;

        Ok(self.lock().signals)
    }

    fn set_modem_lines(&self, dtr: Option<bool>, rts: Option<bool>) -> Result<()> {
        let _guard = self.enter()?;
        self.check_control()?;

        let mut state = self.lock();
        if let Some(dtr) = dtr {
            state.signals.dtr = dtr;
        }
        if let Some(rts) = rts {
            state.signals.rts = rts;
        }
        Ok(())
    }

    fn close(&self) {
        if self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            self.inner.closed_while_busy.store(true, Ordering::SeqCst);
        }

        self.lock().closed = true;
        self.inner.readable.notify_all();
    }
}
