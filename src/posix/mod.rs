//! Serial device implementation for POSIX-compliant operating systems.

pub use self::tty::*;

pub(crate) mod poll;
mod tty;
