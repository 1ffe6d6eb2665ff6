use std::time::{Duration, Instant};

use crate::cancel::CancelToken;

/// Time source for polling loops and inter-task delays.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Sleeps for `duration` unless cancelled first. Returns `true` when cancelled.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        cancel.wait(duration)
    }
}
