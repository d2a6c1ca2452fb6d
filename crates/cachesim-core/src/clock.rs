//! Virtual clock for discrete-event simulation.
//!
//! The [`SimClock`] tracks simulation time independently of wall-clock time,
//! advancing only when events are processed, so runs are repeatable
//! regardless of host machine speed.

use serde::{Deserialize, Serialize};

/// Virtual simulation clock, in the time unit of the workload.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SimClock {
    now: f64,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    pub fn new() -> Self {
        Self { now: 0.0 }
    }

    /// Current simulation time.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Advance the clock to `time`.
    ///
    /// Returns false and leaves the clock untouched if `time` lies in the
    /// past or is not a finite number.
    #[must_use]
    pub fn advance_to(&mut self, time: f64) -> bool {
        if !time.is_finite() || time < self.now {
            return false;
        }
        self.now = time;
        true
    }
}
