use std::env;
use std::thread;
use std::time::{Duration, Instant};

use serial_hal::prelude::*;

fn main() {
    env_logger::init();

    for arg in env::args_os().skip(1) {
        println!("opening port: {:?}", arg);
        let port = serial_hal::open(&arg, 1024, &serial_hal::Settings::new(9600)).unwrap();

        interact(&*port).unwrap();
    }
}

fn interact<T: Serial + ModemControl>(port: &T) -> serial_hal::Result<()> {
    println!("pulsing reset");
    port.set_control_signals(false, false)?;
    thread::sleep(Duration::from_millis(50));
    port.set_rts(true)?;
    port.set_dtr(true)?;

    let mut tracker = serial_hal::CursorTracker::new(port.receive_cursor());
    let buf: Vec<u8> = (0..255).collect();

    println!("writing bytes");
    port.write(&buf[..])?;

    println!("reading bytes");
    let mut received = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(1);

    while received.len() < buf.len() && Instant::now() < deadline {
        tracker.read_new(port.receive_buffer(), port.receive_cursor(), &mut received);
        thread::sleep(Duration::from_millis(10));
    }

    println!("received {} bytes: {:?}", received.len(), received);

    Ok(())
}
