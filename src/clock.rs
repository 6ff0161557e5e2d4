//! Calibrated nanosecond clock
//!
//! WASI guests read both `CLOCK_REALTIME` and `CLOCK_MONOTONIC`. The wall
//! clock exposed here is a monotonic counter offset by a one-time wall-clock
//! calibration taken at startup, so repeated reads never go backwards within
//! a process lifetime while still approximating wall time. Precision degrades
//! at very large uptimes; that is an accepted limitation for a single-shot
//! CLI invocation.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// One-time wall-clock calibration
///
/// Captured once per process and passed into the clock source explicitly,
/// so tests can inject a fixed offset instead of relying on hidden state.
#[derive(Debug, Clone, Copy)]
pub struct ClockCalibration {
    /// Monotonic reference point
    base_instant: Instant,

    /// Wall-clock nanoseconds since the Unix epoch at `base_instant`
    base_wall_ns: u64,
}

impl ClockCalibration {
    /// Capture the wall/monotonic offset now
    pub fn at_startup() -> Self {
        let base_instant = Instant::now();
        let base_wall_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            base_instant,
            base_wall_ns,
        }
    }

    /// Build a calibration with a fixed wall offset (for tests)
    pub fn with_base_wall_ns(base_wall_ns: u64) -> Self {
        Self {
            base_instant: Instant::now(),
            base_wall_ns,
        }
    }

    /// Wall-clock nanoseconds: calibrated base plus monotonic elapsed time
    pub fn wall_ns(&self) -> u64 {
        self.base_wall_ns
            .saturating_add(self.base_instant.elapsed().as_nanos() as u64)
    }

    /// Raw monotonic nanoseconds since calibration
    pub fn monotonic_ns(&self) -> u64 {
        self.base_instant.elapsed().as_nanos() as u64
    }
}

/// Wall clock handed to the WASI context, backed by a [`ClockCalibration`]
pub(crate) struct CalibratedWallClock {
    pub(crate) calibration: ClockCalibration,
}

impl wasmtime_wasi::HostWallClock for CalibratedWallClock {
    fn resolution(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(1)
    }

    fn now(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.calibration.wall_ns())
    }
}

/// Monotonic clock handed to the WASI context
pub(crate) struct CalibratedMonotonicClock {
    pub(crate) calibration: ClockCalibration,
}

impl wasmtime_wasi::HostMonotonicClock for CalibratedMonotonicClock {
    fn resolution(&self) -> u64 {
        1
    }

    fn now(&self) -> u64 {
        self.calibration.monotonic_ns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_is_monotonic() {
        let calibration = ClockCalibration::at_startup();
        let a = calibration.wall_ns();
        let b = calibration.wall_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_injected_offset() {
        let calibration = ClockCalibration::with_base_wall_ns(1_000_000_000);
        let now = calibration.wall_ns();
        assert!(now >= 1_000_000_000);
        // Elapsed time since construction is tiny compared to a full second
        assert!(now < 2_000_000_000);
    }

    #[test]
    fn test_monotonic_starts_near_zero() {
        let calibration = ClockCalibration::at_startup();
        assert!(calibration.monotonic_ns() < 1_000_000_000);
    }

    #[test]
    fn test_calibration_approximates_wall_time() {
        let calibration = ClockCalibration::at_startup();
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;
        let diff = wall.abs_diff(calibration.wall_ns());
        assert!(diff < 1_000_000_000, "calibrated clock drifted: {diff}ns");
    }
}
