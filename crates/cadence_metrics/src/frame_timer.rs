//! Tick timing against a fixed frame budget

use super::ring_buffer::RingBuffer;
use std::time::{Duration, Instant};

pub struct FrameTimer {
    frame_start: Instant,
    frame_times: RingBuffer<Duration>,
    frames: u64,
    overruns: u64,
    budget: Option<Duration>,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frame_start: Instant::now(),
            frame_times: RingBuffer::new(capacity),
            frames: 0,
            overruns: 0,
            budget: None,
        }
    }

    /// Count frames that take longer than `budget` as overruns.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn begin(&mut self) {
        self.frame_start = Instant::now();
    }

    pub fn end(&mut self) {
        let elapsed = self.frame_start.elapsed();
        self.frames += 1;
        if self.budget.is_some_and(|budget| elapsed > budget) {
            self.overruns += 1;
        }
        self.frame_times.push(elapsed);
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn fps(&self) -> f64 {
        let avg = self.frame_times.average();
        if avg.as_secs_f64() > 0.0 {
            1.0 / avg.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn frame_time_ms(&self) -> f64 {
        self.frame_times.average().as_secs_f64() * 1000.0
    }

    pub fn frame_time_range_ms(&self) -> (f64, f64) {
        let (min, max) = self.frame_times.min_max();
        (min.as_secs_f64() * 1000.0, max.as_secs_f64() * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_counts_every_frame_as_overrun() {
        let mut timer = FrameTimer::new(4).with_budget(Duration::ZERO);
        for _ in 0..3 {
            timer.begin();
            std::thread::sleep(Duration::from_millis(1));
            timer.end();
        }
        assert_eq!(timer.frames(), 3);
        assert_eq!(timer.overruns(), 3);
        assert!(timer.frame_time_ms() > 0.0);
    }
}
