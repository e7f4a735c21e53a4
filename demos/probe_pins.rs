use std::env;
use std::thread;
use std::time::Duration;

use serial_hal::prelude::*;
use serial_hal::{ModemIn, ModemOut};

fn main() {
    env_logger::init();

    for arg in env::args_os().skip(1) {
        let port = serial_hal::open(&arg, 64, &serial_hal::Settings::new(9600)).unwrap();
        println!("opened device {:?}", arg);

        let rts = serial_hal::acquire_output_pin(port.clone(), ModemOut::Rts);
        let dtr = serial_hal::acquire_output_pin(port.clone(), ModemOut::Dtr);
        let cts = serial_hal::acquire_input_pin(port.clone(), ModemIn::Cts);
        let dsr = serial_hal::acquire_input_pin(port, ModemIn::Dsr);

        probe_pins(&rts, &dtr, &cts, &dsr).unwrap();
    }
}

fn probe_pins<O: OutputPin, I: InputPin>(rts: &O, dtr: &O, cts: &I, dsr: &I) -> serial_hal::Result<()> {
    rts.set_level(false)?;
    dtr.set_level(false)?;

    let mut toggle = true;

    loop {
        thread::sleep(Duration::from_millis(1000));

        if toggle {
            rts.set_level(!rts.level()?)?;
        } else {
            dtr.set_level(!dtr.level()?)?;
        }

        println!(
            "RTS={:5?} DTR={:5?} CTS={:5?} DSR={:?}",
            rts.level()?,
            dtr.level()?,
            cts.level()?,
            dsr.level()?
        );

        toggle = !toggle;
    }
}
