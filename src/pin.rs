//! Modem lines presented as generic digital pins.
//!
//! DTR and RTS become `OutputPin`s, DSR and CTS become `InputPin`s. A pin holds a shared
//! reference to the driver that owns the lines, so the driver stays open for as long as any of
//! its pins exist.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::{InputPin, ModemControl, OutputPin, PinSettings};

/// A modem output line.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModemOut {
    /// Data Terminal Ready.
    Dtr,

    /// Request To Send.
    Rts,
}

/// A modem input line.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModemIn {
    /// Data Set Ready.
    Dsr,

    /// Clear To Send.
    Cts,
}

/// An output pin driving DTR or RTS on a shared driver.
pub struct ModemOutputPin<M: ModemControl> {
    manager: Arc<M>,
    line: ModemOut,
}

/// Wraps one of `manager`'s output lines as an `OutputPin`.
///
/// ```no_run
/// use serial_hal::prelude::*;
/// use serial_hal::ModemOut;
///
/// let port = serial_hal::open("/dev/ttyUSB0", 1024, &Default::default()).unwrap();
/// let reset = serial_hal::acquire_output_pin(port.clone(), ModemOut::Dtr);
///
/// reset.set_level(false).unwrap();
/// ```
pub fn acquire_output_pin<M: ModemControl>(manager: Arc<M>, line: ModemOut) -> ModemOutputPin<M> {
    ModemOutputPin { manager, line }
}

impl<M: ModemControl> ModemOutputPin<M> {
    pub fn line(&self) -> ModemOut {
        self.line
    }
}

impl<M: ModemControl> OutputPin for ModemOutputPin<M> {
    /// Modem lines are push-pull only, so open-drain is refused. Pull resistors cannot be
    /// controlled and are accepted without effect.
    fn configure(&self, settings: &PinSettings) -> Result<()> {
        if settings.open_drain {
            return Err(Error::UnsupportedOperation("modem lines cannot be open-drain"));
        }

        Ok(())
    }

    fn set_level(&self, high: bool) -> Result<()> {
        match self.line {
            ModemOut::Dtr => self.manager.set_dtr(high),
            ModemOut::Rts => self.manager.set_rts(high),
        }
    }

    fn level(&self) -> Result<bool> {
        let signals = self.manager.control_signals()?;

        Ok(match self.line {
            ModemOut::Dtr => signals.dtr,
            ModemOut::Rts => signals.rts,
        })
    }
}

impl<M: ModemControl> fmt::Debug for ModemOutputPin<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ModemOutputPin").field("line", &self.line).finish()
    }
}

/// An input pin reading DSR or CTS on a shared driver.
pub struct ModemInputPin<M: ModemControl> {
    manager: Arc<M>,
    line: ModemIn,
}

/// Wraps one of `manager`'s input lines as an `InputPin`.
pub fn acquire_input_pin<M: ModemControl>(manager: Arc<M>, line: ModemIn) -> ModemInputPin<M> {
    ModemInputPin { manager, line }
}

impl<M: ModemControl> ModemInputPin<M> {
    pub fn line(&self) -> ModemIn {
        self.line
    }
}

impl<M: ModemControl> InputPin for ModemInputPin<M> {
    /// Input lines have no configurable electrical settings; every request is accepted without
    /// effect.
    fn configure(&self, _settings: &PinSettings) -> Result<()> {
        Ok(())
    }

    fn level(&self) -> Result<bool> {
        let signals = self.manager.control_signals()?;

        Ok(match self.line {
            ModemIn::Dsr => signals.dsr,
            ModemIn::Cts => signals.cts,
        })
    }
}

impl<M: ModemControl> fmt::Debug for ModemInputPin<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ModemInputPin").field("line", &self.line).finish()
    }
}
