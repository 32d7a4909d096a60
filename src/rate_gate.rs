//! Open-loop rate limiter.
//!
//! `period = 1s / io_num_per_second * batch_size`. Once per period, up to
//! `batch_size` logical I/Os are popped off the pending FIFO and submitted.
//! `tick()` is non-blocking by design: the worker loop must keep draining
//! `check_io` every iteration even when the gate hasn't armed, so the
//! busy-poll itself is kept rather than replaced with a sleep.

use std::time::{Duration, Instant};

pub struct RateGate {
    period: Duration,
    batch_size: u32,
    next_deadline: Instant,
}

impl RateGate {
    pub fn new(io_num_per_second: u64, batch_size: u32) -> Self {
        let per_io = Duration::from_secs_f64(1.0 / io_num_per_second.max(1) as f64);
        let period = per_io * batch_size.max(1);
        Self { period, batch_size: batch_size.max(1), next_deadline: Instant::now() + period }
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Returns true once the current period has elapsed, arming the next one.
    pub fn tick(&mut self) -> bool {
        let now = Instant::now();
        if now < self.next_deadline {
            return false;
        }
        self.next_deadline += self.period;
        if self.next_deadline < now {
            self.next_deadline = now + self.period;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_does_not_fire_before_period_elapses() {
        let mut gate = RateGate::new(1_000_000, 1);
        assert!(!gate.tick());
    }

    #[test]
    fn tick_fires_after_period_elapses() {
        let mut gate = RateGate::new(1_000_000, 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(gate.tick());
    }

    #[test]
    fn batch_size_reflects_configured_value() {
        let gate = RateGate::new(100, 32);
        assert_eq!(gate.batch_size(), 32);
    }
}
