//! Spin-wait timing for sub-millisecond pulses.

use std::time::{Duration, Instant};

/// Waits by spinning on the monotonic clock instead of yielding to the scheduler.
///
/// Occupies the calling thread for the whole wait.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighResolutionTimer;

impl HighResolutionTimer {
    pub fn new() -> Self {
        HighResolutionTimer
    }

    pub fn sleep(&self, duration: Duration) {
        let start = Instant::now();
        while start.elapsed() < duration {
            std::hint::spin_loop();
        }
    }
}
