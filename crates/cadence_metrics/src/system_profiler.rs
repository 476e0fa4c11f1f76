//! Accumulated wall time per named system

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemTiming {
    pub total: Duration,
    pub samples: u64,
}

impl SystemTiming {
    pub fn average(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total / self.samples as u32
        }
    }
}

#[derive(Debug, Default)]
pub struct SystemProfiler {
    timings: HashMap<String, SystemTiming>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
        }
    }

    pub fn time_system<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    /// Record a duration measured elsewhere (e.g. on a worker thread).
    pub fn record(&mut self, name: &str, elapsed: Duration) {
        let timing = self.timings.entry(name.to_string()).or_default();
        timing.total += elapsed;
        timing.samples += 1;
    }

    pub fn get_timing(&self, name: &str) -> Duration {
        self.timings
            .get(name)
            .map(|timing| timing.total)
            .unwrap_or(Duration::ZERO)
    }

    pub fn timing(&self, name: &str) -> Option<SystemTiming> {
        self.timings.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) {
        self.timings.remove(name);
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SystemTiming)> {
        self.timings.iter()
    }
}
