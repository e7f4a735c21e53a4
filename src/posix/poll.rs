use std::io;
use std::time::Duration;

use libc::{c_int, c_short};

/// Waits for `fd` to become readable. Fails with `TimedOut` if it doesn't within `timeout`.
pub fn wait_read_fd(fd: c_int, timeout: Duration) -> io::Result<()> {
    wait_fd(fd, libc::POLLIN, timeout)
}

/// Waits for `fd` to become writable. Fails with `TimedOut` if it doesn't within `timeout`.
pub fn wait_write_fd(fd: c_int, timeout: Duration) -> io::Result<()> {
    wait_fd(fd, libc::POLLOUT, timeout)
}

fn wait_fd(fd: c_int, events: c_short, timeout: Duration) -> io::Result<()> {
    use libc::{EINTR, POLLHUP, POLLNVAL};

    let mut fds = [libc::pollfd {
        fd,
        events,
        revents: 0,
    }];

    let wait = do_poll(&mut fds, timeout);

    if wait < 0 {
        let err = io::Error::last_os_error();

        // a signal cut the wait short; report it like a timeout so callers simply poll again
        if err.raw_os_error() == Some(EINTR) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "operation interrupted"));
        }

        return Err(err);
    }

    if wait == 0 {
        return Err(io::Error::new(io::ErrorKind::TimedOut, "operation timed out"));
    }

    if fds[0].revents & events != 0 {
        return Ok(());
    }

    if fds[0].revents & POLLHUP != 0 {
        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
    }

    if fds[0].revents & POLLNVAL != 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid input"));
    }

    Err(io::Error::new(io::ErrorKind::Other, "unknown I/O error"))
}

#[inline]
fn do_poll(fds: &mut [libc::pollfd], timeout: Duration) -> c_int {
    let millis = timeout.as_millis().min(c_int::max_value() as u128) as c_int;

    unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, millis) }
}
