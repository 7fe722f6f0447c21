//! Timeline position with clamped seek

use serde::{Deserialize, Serialize};

/// Current playhead position against a fixed timeline duration, both in
/// seconds. `current` is clamped to `[0, duration]` on every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimelinePosition {
    current: f64,
    duration: f64,
}

impl TimelinePosition {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            current: 0.0,
            duration: duration_secs.max(0.0),
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn set_current(&mut self, secs: f64) {
        self.current = secs.clamp(0.0, self.duration);
    }

    /// Seconds of timeline left from the playhead.
    pub fn remaining(&self) -> f64 {
        self.duration - self.current
    }

    pub fn at_end(&self) -> bool {
        self.duration > 0.0 && self.current >= self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_clamps_to_bounds() {
        let mut pos = TimelinePosition::new(120.0);

        pos.set_current(130.0);
        assert_eq!(pos.current(), 120.0);
        assert!(pos.at_end());

        pos.set_current(-5.0);
        assert_eq!(pos.current(), 0.0);
        assert!(!pos.at_end());
    }

    #[test]
    fn test_remaining() {
        let mut pos = TimelinePosition::new(10.0);
        pos.set_current(7.5);
        assert_eq!(pos.remaining(), 2.5);
    }

    #[test]
    fn test_zero_duration_never_at_end() {
        let pos = TimelinePosition::new(0.0);
        assert!(!pos.at_end());
        assert_eq!(pos.remaining(), 0.0);
    }
}
