//! Wall-clock time and blocking delays used by the capture loop.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of the current time and of blocking sleeps.
///
/// Every sleep in the pipeline (between burst captures, between poll cycles,
/// between upload attempts) and every artifact timestamp goes through this,
/// so tests can run the loop on simulated time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Real time backed by `chrono::Utc` and `std::thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_system_clock_sleeps() {
        let start = Instant::now();
        SystemClock.sleep(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let a = SystemClock.now();
        SystemClock.sleep(Duration::from_millis(5));
        assert!(SystemClock.now() > a);
    }
}
