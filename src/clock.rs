use std::time::Instant;

use crate::SteadyClock;

/// Nanosecond steady clock counting from its creation.
#[derive(Debug, Copy, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock { start: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        MonotonicClock::new()
    }
}

impl SteadyClock for MonotonicClock {
    fn frequency(&self) -> u64 {
        1_000_000_000
    }

    fn uptime(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;
    use std::time::Duration;

    #[test]
    fn clock_counts_nanoseconds() {
        assert_eq!(MonotonicClock::new().frequency(), 1_000_000_000);
    }

    #[test]
    fn uptime_never_decreases() {
        let clock = MonotonicClock::new();

        let first = clock.uptime();
        thread::sleep(Duration::from_millis(2));
        let second = clock.uptime();

        assert!(second >= first + 1_000_000);
    }
}
