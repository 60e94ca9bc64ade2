use std::time::Duration;

use crate::scanning::clock::Clock;
use crate::shared::constants::{DEFAULT_TARGET_FPS, MIN_TARGET_FPS};

/// Scheduling gate: consecutive ticks are at least one interval apart.
#[derive(Clone, Debug)]
pub struct Throttle {
    interval_ms: u64,
    last_tick: Option<u64>,
}

impl Throttle {
    /// Interval derived from a target frame rate, rounded up to whole
    /// milliseconds. Rates below the minimum (including zero and negative)
    /// are clamped up to it; NaN falls back to the default rate.
    pub fn from_fps(fps: f64) -> Self {
        let fps = if fps.is_nan() {
            DEFAULT_TARGET_FPS
        } else {
            fps.max(MIN_TARGET_FPS)
        };
        Self {
            interval_ms: (1000.0 / fps).ceil() as u64,
            last_tick: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Sleeps until the next tick is due, records it and returns its time.
    /// The first tick is never delayed.
    pub fn wait(&mut self, clock: &dyn Clock) -> u64 {
        if let Some(last) = self.last_tick {
            let due = last + self.interval_ms;
            let now = clock.now_ms();
            if now < due {
                clock.sleep(Duration::from_millis(due - now));
            }
        }
        let tick = clock.now_ms();
        self.last_tick = Some(tick);
        tick
    }

    pub fn reset(&mut self) {
        self.last_tick = None;
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::from_fps(DEFAULT_TARGET_FPS)
    }
}
