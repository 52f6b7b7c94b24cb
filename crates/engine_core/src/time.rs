//! Simulation clock driving fixed-rate physics ticks.

use std::time::Duration;

/// Tracks simulated time and converts variable frame deltas into fixed ticks.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    /// Total simulated time (sum of consumed fixed steps).
    elapsed: Duration,
    /// Duration of one simulation tick (default 60 Hz).
    fixed_step: Duration,
    /// Frame time not yet consumed by a tick.
    accumulator: Duration,
    /// Ticks run since start.
    tick_count: u64,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationClock {
    /// Create a clock ticking at 60 Hz.
    pub fn new() -> Self {
        Self::with_fixed_step(Duration::from_secs_f64(1.0 / 60.0))
    }

    /// Create a clock with a specific tick duration.
    pub fn with_fixed_step(fixed_step: Duration) -> Self {
        Self {
            elapsed: Duration::ZERO,
            fixed_step,
            accumulator: Duration::ZERO,
            tick_count: 0,
        }
    }

    /// Feed a frame's wall-clock delta. Returns how many fixed ticks are now due.
    ///
    /// Elapsed time only advances as ticks are consumed through [`Self::tick`].
    pub fn accumulate(&mut self, frame_delta: Duration) -> u32 {
        self.accumulator += frame_delta;
        let due = self.accumulator.as_nanos() / self.fixed_step.as_nanos().max(1);
        due.min(u32::MAX as u128) as u32
    }

    /// Consume one fixed tick if one is due.
    pub fn tick(&mut self) -> bool {
        if self.accumulator >= self.fixed_step {
            self.accumulator -= self.fixed_step;
            self.elapsed += self.fixed_step;
            self.tick_count += 1;
            true
        } else {
            false
        }
    }

    /// Total simulated time in seconds.
    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Total simulated time.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn fixed_step(&self) -> Duration {
        self.fixed_step
    }

    /// Tick duration in seconds.
    pub fn fixed_step_seconds(&self) -> f32 {
        self.fixed_step.as_secs_f32()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Set the tick rate in Hz.
    pub fn set_fixed_rate(&mut self, hz: f64) {
        self.fixed_step = Duration::from_secs_f64(1.0 / hz);
    }
}
