//! Time management utilities

use std::time::{Duration, Instant};

/// Wall-clock rate limiter
///
/// Admits at most one event per `min_interval`. Callers pass the current
/// instant explicitly so frame callbacks and tests share one code path.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_admitted: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter that admits events at most `hz` times per second
    pub fn per_second(hz: f64) -> Self {
        let min_interval = if hz > 0.0 {
            Duration::from_secs_f64(1.0 / hz)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            last_admitted: None,
        }
    }

    /// Try to admit an event at `now`
    ///
    /// The first event is always admitted. An admitted event restarts the
    /// interval even if the caller later abandons the work.
    pub fn try_admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_admitted {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_admitted = Some(now);
        true
    }

    /// Forget the last admitted event
    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}
