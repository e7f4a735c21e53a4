//! Echoes standard input back to standard output through a console driver, with timestamps.

use std::thread;
use std::time::Duration;

use serial_hal::prelude::*;
use serial_hal::MonotonicClock;

fn main() {
    env_logger::init();

    let clock = MonotonicClock::new();
    let port = serial_hal::console(64).unwrap();
    let mut tracker = port.tracker();
    let mut line = Vec::new();

    loop {
        let received = port.read_since(&mut tracker, &mut line);

        if received.overrun {
            eprintln!("input arrived faster than it was echoed; some was lost");
        }

        if received.count > 0 {
            let millis = clock.uptime() / (clock.frequency() / 1000);
            port.write(format!("[{:>8} ms] ", millis).as_bytes()).unwrap();
            port.write(&line).unwrap();
            line.clear();
        }

        thread::sleep(Duration::from_millis(20));
    }
}
