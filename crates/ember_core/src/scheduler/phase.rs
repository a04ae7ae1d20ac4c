//! Frame phases and per-frame bookkeeping.

use std::fmt;

/// Where the frame loop is.
///
/// ```text
/// Idle → AcquireCompute → [RunSpawn] → RunUpdate → RunDeathCheck
///      → ReleaseToGraphics → Draw → Present → Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FramePhase {
    /// Between frames.
    #[default]
    Idle,
    /// Waiting for graphics and taking the buffer.
    AcquireCompute,
    /// Spawn kernel.
    RunSpawn,
    /// Update kernel.
    RunUpdate,
    /// Death-check kernel.
    RunDeathCheck,
    /// Submitting and waiting for compute.
    ReleaseToGraphics,
    /// Drawing the buffer.
    Draw,
    /// Presenting.
    Present,
}

impl FramePhase {
    /// Whether `next` may follow `self`.
    #[must_use]
    pub fn can_advance_to(self, next: FramePhase) -> bool {
        use FramePhase::{
            AcquireCompute, Draw, Idle, Present, ReleaseToGraphics, RunDeathCheck, RunSpawn,
            RunUpdate,
        };
        matches!(
            (self, next),
            (Idle, AcquireCompute)
                | (AcquireCompute, RunSpawn | RunUpdate)
                | (RunSpawn, RunUpdate)
                | (RunUpdate, RunDeathCheck)
                | (RunDeathCheck, ReleaseToGraphics)
                | (ReleaseToGraphics, Draw)
                | (Draw, Present)
                | (Present, Idle)
        )
    }
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Current phase with checked transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTracker {
    phase: FramePhase,
}

impl PhaseTracker {
    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Moves to `next`.
    ///
    /// # Panics
    ///
    /// In debug builds, panics on an illegal transition.
    pub fn advance(&mut self, next: FramePhase) {
        let legal = self.phase.can_advance_to(next);
        if !legal {
            tracing::error!(from = %self.phase, to = %next, "illegal frame phase transition");
        }
        debug_assert!(legal, "illegal frame phase transition {} -> {next}", self.phase);
        tracing::trace!(phase = %next, "frame phase");
        self.phase = next;
    }

    /// Returns to idle after an aborted frame.
    pub fn reset(&mut self) {
        self.phase = FramePhase::Idle;
    }
}

/// Outcome of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Frame number.
    pub index: u64,
    /// Timestep used.
    pub dt: f32,
    /// Simulation time used.
    pub current_time: f32,
    /// `K` for this frame.
    pub spawn_budget: u32,
    /// Whether the spawn kernel ran.
    pub spawn_dispatched: bool,
    /// Whether a frame reached the screen.
    pub presented: bool,
    /// Acquire through release, in microseconds.
    pub compute_us: u32,
    /// Draw and present, in microseconds.
    pub render_us: u32,
}

/// Totals over the run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Frames completed.
    pub total_frames: u64,
    /// Frames that ran the spawn kernel.
    pub spawn_dispatches: u64,
    /// Sum of every frame's `K`.
    pub total_spawn_budget: u64,
    /// Frames presented.
    pub presented_frames: u64,
    /// Frames drawn but not presented.
    pub skipped_presents: u64,
    /// Slowest frame, in microseconds.
    pub worst_frame_time_us: u32,
}

impl FrameStats {
    /// Folds one report in.
    pub fn record(&mut self, report: &FrameReport) {
        self.total_frames += 1;
        if report.spawn_dispatched {
            self.spawn_dispatches += 1;
        }
        self.total_spawn_budget += u64::from(report.spawn_budget);
        if report.presented {
            self.presented_frames += 1;
        } else {
            self.skipped_presents += 1;
        }
        self.worst_frame_time_us = self
            .worst_frame_time_us
            .max(report.compute_us.saturating_add(report.render_us));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        let with_spawn = [
            FramePhase::AcquireCompute,
            FramePhase::RunSpawn,
            FramePhase::RunUpdate,
            FramePhase::RunDeathCheck,
            FramePhase::ReleaseToGraphics,
            FramePhase::Draw,
            FramePhase::Present,
            FramePhase::Idle,
        ];
        let mut tracker = PhaseTracker::default();
        for phase in with_spawn {
            tracker.advance(phase);
        }
        assert_eq!(tracker.phase(), FramePhase::Idle);
        assert!(FramePhase::AcquireCompute.can_advance_to(FramePhase::RunUpdate));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!FramePhase::Idle.can_advance_to(FramePhase::Draw));
        assert!(!FramePhase::RunUpdate.can_advance_to(FramePhase::RunSpawn));
        assert!(!FramePhase::AcquireCompute.can_advance_to(FramePhase::Draw));
        assert!(!FramePhase::Draw.can_advance_to(FramePhase::AcquireCompute));
    }

    #[test]
    fn test_stats_record() {
        let mut stats = FrameStats::default();
        let report = FrameReport {
            index: 0,
            dt: 0.0,
            current_time: 0.0,
            spawn_budget: 0,
            spawn_dispatched: false,
            presented: false,
            compute_us: 10,
            render_us: 5,
        };
        stats.record(&report);
        stats.record(&FrameReport {
            spawn_budget: 1000,
            spawn_dispatched: true,
            presented: true,
            ..report
        });
        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.spawn_dispatches, 1);
        assert_eq!(stats.total_spawn_budget, 1000);
        assert_eq!(stats.presented_frames, 1);
        assert_eq!(stats.skipped_presents, 1);
        assert_eq!(stats.worst_frame_time_us, 15);
    }
}
