//! # Frame Scheduler
//!
//! Drives one frame at a time, single-threaded and synchronous:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        FRAME TIMELINE                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ├── Apply camera intents (dt)                               │
//! │  ├── Plan kernels: K = ceil(rate * dt), seeds, time          │
//! │  ├── Acquire buffer for compute (waits for last draw)        │
//! │  │   ├── spawn (skipped when K = 0)                          │
//! │  │   ├── update                                              │
//! │  │   └── death check                                         │
//! │  ├── Release to graphics (submit + wait)                     │
//! │  ├── Draw all N slots                                        │
//! │  └── Present                                                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error aborts the frame. The compute scope still hands the buffer
//! back, and the caller is expected to shut down.

mod clock;
mod phase;
mod render;
mod seed;

use std::time::Instant;

pub use clock::{FrameClock, FrameTime};
pub use phase::{FramePhase, FrameReport, FrameStats, PhaseTracker};
pub use render::{FrameView, HeadlessRenderer, ParticleRenderer};
pub use seed::{FrameSeeds, SeedSequence, MAX_SEED_STEP, SEED_HORIZON_FRAMES};

use crate::camera::{CameraController, CameraIntents, ViewportState};
use crate::compute::{ComputeStage, ParticleDevice};
use crate::config::SimulationConfig;
use crate::error::FrameResult;
use crate::protocol::SharedParticleBuffer;

/// Owns the buffer, the renderer and the per-frame state.
pub struct FrameScheduler<D: ParticleDevice, R: ParticleRenderer<D>> {
    buffer: SharedParticleBuffer<D>,
    renderer: R,
    stage: ComputeStage,
    seeds: SeedSequence,
    camera: CameraController,
    viewport: ViewportState,
    tracker: PhaseTracker,
    stats: FrameStats,
    initialized: bool,
}

impl<D: ParticleDevice, R: ParticleRenderer<D>> FrameScheduler<D, R> {
    /// Builds a scheduler for a `width` x `height` viewport.
    #[must_use]
    pub fn new(device: D, renderer: R, config: &SimulationConfig, width: u32, height: u32) -> Self {
        Self {
            buffer: SharedParticleBuffer::new(device),
            renderer,
            stage: ComputeStage::from_config(config),
            seeds: SeedSequence::from_config(config),
            camera: CameraController::from_config(&config.camera),
            viewport: ViewportState::new(width, height, &config.camera),
            tracker: PhaseTracker::default(),
            stats: FrameStats::default(),
            initialized: false,
        }
    }

    /// Runs the init kernel. Called once; later calls do nothing.
    ///
    /// # Errors
    ///
    /// Fails if the init dispatch fails.
    pub fn initialize(&mut self) -> FrameResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.stage.initialize(&mut self.buffer)?;
        self.initialized = true;
        Ok(())
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Any device or protocol error aborts the frame; the buffer is left
    /// idle.
    pub fn run_frame(&mut self, time: FrameTime, intents: CameraIntents) -> FrameResult<FrameReport> {
        self.initialize()?;
        let result = self.execute_frame(time, intents);
        match &result {
            Ok(report) => self.stats.record(report),
            Err(err) => {
                tracing::error!(frame = time.index, phase = %self.tracker.phase(), %err, "frame aborted");
                self.tracker.reset();
            }
        }
        result
    }

    #[allow(clippy::cast_possible_truncation)]
    fn execute_frame(&mut self, time: FrameTime, intents: CameraIntents) -> FrameResult<FrameReport> {
        self.camera.apply(intents, time.dt);
        let plan = self.stage.plan_frame(time, self.seeds.next_frame());

        // === PHASE 1: Compute ===
        let compute_start = Instant::now();
        self.tracker.advance(FramePhase::AcquireCompute);
        let mut scope = self.buffer.acquire_for_compute()?;
        if let Some(spawn) = &plan.spawn {
            self.tracker.advance(FramePhase::RunSpawn);
            scope.dispatch(spawn)?;
        }
        self.tracker.advance(FramePhase::RunUpdate);
        scope.dispatch(&plan.update)?;
        self.tracker.advance(FramePhase::RunDeathCheck);
        scope.dispatch(&plan.death_check)?;
        self.tracker.advance(FramePhase::ReleaseToGraphics);
        scope.release()?;
        let compute_us = compute_start.elapsed().as_micros() as u32;

        // === PHASE 2: Draw ===
        let render_start = Instant::now();
        self.tracker.advance(FramePhase::Draw);
        let view = FrameView {
            projection: self.viewport.projection(),
            view: self.camera.state().view_matrix(),
            particle_count: self.buffer.capacity(),
        };
        let frame = {
            let access = self.buffer.begin_draw()?;
            self.renderer.draw(&access, &view)?
        };

        // === PHASE 3: Present ===
        self.tracker.advance(FramePhase::Present);
        let presented = match frame {
            Some(frame) => {
                self.renderer.present(frame);
                true
            }
            None => false,
        };
        self.tracker.advance(FramePhase::Idle);
        let render_us = render_start.elapsed().as_micros() as u32;

        Ok(FrameReport {
            index: time.index,
            dt: time.dt,
            current_time: time.current_time,
            spawn_budget: plan.spawn_budget,
            spawn_dispatched: plan.spawn.is_some(),
            presented,
            compute_us,
            render_us,
        })
    }

    /// Adopts a new window size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.viewport.resize(width, height) {
            self.renderer.resize(width, height);
            tracing::debug!(width, height, "viewport resized");
        }
    }

    /// Drains the device and returns it with the renderer.
    ///
    /// # Errors
    ///
    /// Fails if the drain fails.
    pub fn shutdown(self) -> FrameResult<(D, R)> {
        let device = self.buffer.into_device()?;
        tracing::info!(
            frames = self.stats.total_frames,
            spawned_budget = self.stats.total_spawn_budget,
            worst_frame_us = self.stats.worst_frame_time_us,
            "frame loop drained"
        );
        Ok((device, self.renderer))
    }

    /// The shared buffer.
    #[must_use]
    pub fn buffer(&self) -> &SharedParticleBuffer<D> {
        &self.buffer
    }

    /// The renderer.
    #[must_use]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The renderer, mutably.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Camera controller.
    #[must_use]
    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    /// Viewport.
    #[must_use]
    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    /// Current phase; `Idle` between frames.
    #[must_use]
    pub fn phase(&self) -> FramePhase {
        self.tracker.phase()
    }

    /// Totals so far.
    #[must_use]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntent;
    use crate::error::{DeviceErrorKind, FrameError};
    use crate::host::HostDevice;
    use crate::protocol::BufferOwner;

    fn scheduler(capacity: u32) -> FrameScheduler<HostDevice, HeadlessRenderer> {
        let config = SimulationConfig {
            capacity,
            spawn_rate: 20_000.0,
            seed: Some(1),
            ..SimulationConfig::default()
        };
        let device = HostDevice::from_config(&config).unwrap();
        FrameScheduler::new(device, HeadlessRenderer::new(), &config, 800, 600)
    }

    #[test]
    fn test_first_frame_initialises_and_skips_spawn() {
        let mut sched = scheduler(4096);
        let mut clock = FrameClock::new(0.1);
        let report = sched.run_frame(clock.advance(0.0), CameraIntents::NONE).unwrap();

        assert!(!report.spawn_dispatched);
        assert!(report.presented);
        assert_eq!(sched.buffer().device().count_alive(), 0);
        assert_eq!(sched.renderer().last_draw_count(), 4096);
        assert_eq!(sched.phase(), FramePhase::Idle);
        assert_eq!(sched.buffer().owner(), BufferOwner::Idle);
    }

    #[test]
    fn test_frames_spawn_and_draw_everything() {
        let mut sched = scheduler(4096);
        let mut clock = FrameClock::new(0.1);
        for _ in 0..10 {
            let report = sched.run_frame(clock.advance(0.01), CameraIntents::NONE).unwrap();
            assert_eq!(report.spawn_budget, 200);
            assert!(report.spawn_dispatched);
        }
        assert!(sched.buffer().device().count_alive() > 0);
        assert_eq!(sched.renderer().draws(), 10);
        assert_eq!(sched.renderer().owner_violations(), 0);
        assert_eq!(sched.stats().total_spawn_budget, 2000);

        let counts = sched.buffer().journal().counts();
        // One extra pair for init.
        assert_eq!(counts.acquires, 11);
        assert_eq!(counts.releases, 11);
        assert_eq!(counts.draws, 10);
    }

    #[test]
    fn test_camera_intents_applied_with_dt() {
        let mut sched = scheduler(256);
        let start = sched.camera().state().position;
        let intents: CameraIntents = [CameraIntent::MoveUp].into_iter().collect();
        sched.run_frame(FrameClock::new(1.0).advance(0.5), intents).unwrap();
        assert!((sched.camera().state().position.y - (start.y + 25.0)).abs() < 1e-4);
    }

    #[test]
    fn test_failed_frame_returns_buffer() {
        let mut sched = scheduler(256);
        sched.initialize().unwrap();
        sched.buffer.device_mut().inject_dispatch_fault(DeviceErrorKind::DeviceLost);

        let err = sched
            .run_frame(FrameClock::new(0.1).advance(0.05), CameraIntents::NONE)
            .unwrap_err();
        assert!(matches!(err, FrameError::Device(_)));
        assert_eq!(sched.buffer().owner(), BufferOwner::Idle);
        assert_eq!(sched.phase(), FramePhase::Idle);
        assert_eq!(sched.renderer().draws(), 0);
        assert_eq!(sched.stats().total_frames, 0);
    }

    #[test]
    fn test_resize_updates_viewport() {
        let mut sched = scheduler(64);
        sched.resize(1024, 512);
        assert_eq!(sched.viewport().width, 1024);
        sched.resize(0, 0);
        assert_eq!(sched.viewport().height, 512);
    }

    #[test]
    fn test_shutdown_drains() {
        let mut sched = scheduler(64);
        sched.initialize().unwrap();
        let (device, renderer) = sched.shutdown().unwrap();
        assert_eq!(device.stats().drains, 2);
        assert_eq!(renderer.draws(), 0);
    }
}
