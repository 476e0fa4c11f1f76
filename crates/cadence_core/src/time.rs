//! Fixed-rate simulation clock
//!
//! The main loop feeds real elapsed time in and pulls whole ticks out; each
//! tick advances the simulation by exactly [`TICK_DURATION`].

use std::time::Duration;

/// Fixed simulation tick rate (60 Hz = 16.666ms per tick)
pub const TICK_RATE_HZ: u32 = 60;
pub const TICK_DURATION: Duration = Duration::from_micros(16_666); // ~16.666ms

/// Frames slower than this are clamped so one hitch cannot queue up
/// an unbounded number of catch-up ticks.
pub const MAX_FRAME_TIME: Duration = Duration::from_millis(250);

/// Simulation time tracker
pub struct SimulationTime {
    tick_count: u64,
    accumulated_time: Duration,
    pending: Duration,
}

impl SimulationTime {
    pub fn new() -> Self {
        Self {
            tick_count: 0,
            accumulated_time: Duration::ZERO,
            pending: Duration::ZERO,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Seconds each tick advances the simulation by.
    pub fn delta_seconds(&self) -> f32 {
        TICK_DURATION.as_secs_f32()
    }

    /// Queue real elapsed time.
    pub fn accumulate(&mut self, frame_time: Duration) {
        self.pending += frame_time.min(MAX_FRAME_TIME);
    }

    /// Consume one tick worth of queued time, if available.
    pub fn try_tick(&mut self) -> bool {
        if self.pending < TICK_DURATION {
            return false;
        }
        self.pending -= TICK_DURATION;
        self.advance_tick();
        true
    }

    pub fn advance_tick(&mut self) {
        self.tick_count += 1;
        self.accumulated_time += TICK_DURATION;
    }

    /// Fraction of a tick left in the accumulator, for interpolation.
    pub fn alpha(&self) -> f32 {
        self.pending.as_secs_f32() / TICK_DURATION.as_secs_f32()
    }

    pub fn total_time(&self) -> Duration {
        self.accumulated_time
    }
}

impl Default for SimulationTime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulated_time_is_drained_in_whole_ticks() {
        let mut time = SimulationTime::new();
        time.accumulate(TICK_DURATION * 2 + TICK_DURATION / 2);

        assert!(time.try_tick());
        assert!(time.try_tick());
        assert!(!time.try_tick());
        assert_eq!(time.tick_count(), 2);
        assert_eq!(time.total_time(), TICK_DURATION * 2);
        assert!((time.alpha() - 0.5).abs() < 0.01);
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut time = SimulationTime::new();
        time.accumulate(Duration::from_secs(10));
        let mut ticks = 0;
        while time.try_tick() {
            ticks += 1;
        }
        assert_eq!(ticks, MAX_FRAME_TIME.as_micros() / TICK_DURATION.as_micros());
    }
}
