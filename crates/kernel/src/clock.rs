use std::time::Duration;

/// Converts wall-clock time into a whole number of simulation frames.
///
/// Time is accumulated in integer microseconds so the same sequence of
/// `advance` calls always yields the same frame count.
#[derive(Debug, Clone)]
pub struct TickClock {
    ticks_per_second: u32,
    accumulated_us: u64,
    max_catch_up: u32,
}

impl TickClock {
    pub fn new(ticks_per_second: u32) -> Self {
        Self {
            ticks_per_second: ticks_per_second.max(1),
            accumulated_us: 0,
            max_catch_up: 5,
        }
    }

    /// Cap on frames returned by one `advance`; excess time is dropped.
    pub fn with_max_catch_up(mut self, frames: u32) -> Self {
        self.max_catch_up = frames.max(1);
        self
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_micros(self.frame_us())
    }

    fn frame_us(&self) -> u64 {
        1_000_000 / self.ticks_per_second as u64
    }

    /// Add elapsed time and return how many frames are due.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulated_us += elapsed.as_micros() as u64;
        let frame = self.frame_us();
        let due = self.accumulated_us / frame;
        if due > self.max_catch_up as u64 {
            tracing::debug!(due, cap = self.max_catch_up, "dropping frames to catch up");
            self.accumulated_us = 0;
            return self.max_catch_up;
        }
        self.accumulated_us -= due * frame;
        due as u32
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_partial_frames() {
        let mut clock = TickClock::new(30);
        assert_eq!(clock.advance(Duration::from_millis(20)), 0);
        assert_eq!(clock.advance(Duration::from_millis(20)), 1);
        assert_eq!(clock.advance(Duration::from_millis(100)), 3);
    }

    #[test]
    fn catch_up_is_capped() {
        let mut clock = TickClock::new(30).with_max_catch_up(2);
        assert_eq!(clock.advance(Duration::from_secs(1)), 2);
        assert_eq!(clock.advance(Duration::from_millis(10)), 0);
    }
}
