//! Frame timing.
//!
//! The timestep of frame F is the wall-clock time between the start of
//! frame F-1 and the start of frame F. The first frame has `dt = 0`, so it
//! spawns nothing and moves nothing.

use std::time::Instant;

use crate::config::SimulationConfig;

/// Timing of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    /// Frame number, starting at zero.
    pub index: u64,
    /// Timestep in seconds.
    pub dt: f32,
    /// Simulation time in seconds: the sum of every `dt` so far, this one
    /// included.
    pub current_time: f32,
}

/// Produces a [`FrameTime`] per frame.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    sim_time: f64,
    max_dt: f32,
    frames: u64,
}

impl FrameClock {
    /// A clock clamping every step to `max_dt` seconds.
    #[must_use]
    pub fn new(max_dt: f32) -> Self {
        Self {
            last: None,
            sim_time: 0.0,
            max_dt,
            frames: 0,
        }
    }

    /// A clock using the configured step limit.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.max_frame_dt)
    }

    /// Frames produced so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Simulation time so far.
    #[must_use]
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Starts a frame now.
    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// Starts a frame at `now`.
    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = self
            .last
            .map_or(0.0, |prev| now.saturating_duration_since(prev).as_secs_f32());
        self.last = Some(now);
        self.advance(dt)
    }

    /// Starts a frame with an explicit timestep.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&mut self, dt: f32) -> FrameTime {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.max_dt)
        } else {
            0.0
        };
        self.sim_time += f64::from(dt);
        let time = FrameTime {
            index: self.frames,
            dt,
            current_time: self.sim_time as f32,
        };
        self.frames += 1;
        time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_frame_has_zero_dt() {
        let mut clock = FrameClock::new(0.1);
        let start = Instant::now();
        let first = clock.tick_at(start);
        assert_eq!(first, FrameTime::default());

        let second = clock.tick_at(start + Duration::from_millis(16));
        assert_eq!(second.index, 1);
        assert!((second.dt - 0.016).abs() < 1e-6);
        assert!((second.current_time - 0.016).abs() < 1e-6);
    }

    #[test]
    fn test_dt_is_clamped() {
        let mut clock = FrameClock::new(0.1);
        assert_eq!(clock.advance(5.0).dt, 0.1);
        assert_eq!(clock.advance(-1.0).dt, 0.0);
        assert_eq!(clock.advance(f32::NAN).dt, 0.0);
        assert!((clock.sim_time() - 0.1).abs() < 1e-9);
        assert_eq!(clock.frames(), 3);
    }

    #[test]
    fn test_fixed_steps_accumulate() {
        let mut clock = FrameClock::new(0.1);
        let mut last = FrameTime::default();
        for _ in 0..300 {
            last = clock.advance(1.0 / 60.0);
        }
        assert_eq!(last.index, 299);
        assert!((last.current_time - 5.0).abs() < 1e-4);
    }
}
