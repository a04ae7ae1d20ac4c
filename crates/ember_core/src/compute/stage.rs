//! # Compute Stage
//!
//! Turns a frame's timestep, time and seeds into the ordered kernel
//! invocations of that frame:
//!
//! ```text
//!   [spawn (only if K > 0)] ──▶ update ──▶ death check
//! ```
//!
//! `K = ceil(spawn_rate * dt)`, clamped to the buffer capacity.

use crate::compute::{spawn_budget, KernelArgs, KernelInvocation, ParticleDevice};
use crate::config::SimulationConfig;
use crate::error::FrameResult;
use crate::protocol::SharedParticleBuffer;
use crate::scheduler::{FrameSeeds, FrameTime};

/// The kernels of one frame, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    /// Spawn, absent when the budget is zero.
    pub spawn: Option<KernelInvocation>,
    /// Update.
    pub update: KernelInvocation,
    /// Death check.
    pub death_check: KernelInvocation,
    /// `K` for this frame.
    pub spawn_budget: u32,
}

impl FramePlan {
    /// Invocations in dispatch order.
    pub fn invocations(&self) -> impl Iterator<Item = &KernelInvocation> {
        self.spawn
            .iter()
            .chain([&self.update, &self.death_check])
    }
}

/// Builds the kernel invocations for startup and for every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputeStage {
    capacity: u32,
    spawn_rate: f32,
}

impl ComputeStage {
    /// A stage for `capacity` slots spawning `spawn_rate` particles per second.
    #[must_use]
    pub fn new(capacity: u32, spawn_rate: f32) -> Self {
        Self {
            capacity,
            spawn_rate,
        }
    }

    /// A stage configured from `config`.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.capacity, config.spawn_rate)
    }

    /// Slots covered by every dispatch.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The one-time init invocation.
    #[must_use]
    pub fn init_invocation(&self) -> KernelInvocation {
        KernelInvocation::new(KernelArgs::Init, self.capacity)
    }

    /// Plans one frame.
    #[must_use]
    pub fn plan_frame(&self, time: FrameTime, seeds: FrameSeeds) -> FramePlan {
        let budget = spawn_budget(self.spawn_rate, time.dt, self.capacity);
        let spawn = (budget > 0).then(|| {
            KernelInvocation::new(
                KernelArgs::Spawn {
                    count: budget,
                    seed: seeds.spawn,
                    current_time: time.current_time,
                },
                self.capacity,
            )
        });
        FramePlan {
            spawn,
            update: KernelInvocation::new(
                KernelArgs::Update {
                    seed: seeds.update,
                    dt: time.dt,
                },
                self.capacity,
            ),
            death_check: KernelInvocation::new(
                KernelArgs::DeathCheck {
                    current_time: time.current_time,
                },
                self.capacity,
            ),
            spawn_budget: budget,
        }
    }

    /// Runs init in its own acquire/release pair and drains the device.
    ///
    /// # Errors
    ///
    /// Fails if the dispatch, the release, or the drain fails.
    pub fn initialize<D: ParticleDevice>(&self, buffer: &mut SharedParticleBuffer<D>) -> FrameResult<()> {
        let mut scope = buffer.acquire_for_compute()?;
        scope.dispatch(&self.init_invocation())?;
        scope.release()?;
        buffer.drain()?;
        tracing::info!(capacity = self.capacity, "particle buffer initialised");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::Kernel;

    fn seeds() -> FrameSeeds {
        FrameSeeds { spawn: 11, update: 12 }
    }

    #[test]
    fn test_plan_with_spawn() {
        let stage = ComputeStage::new(1_000_000, 200_000.0);
        let time = FrameTime {
            index: 3,
            dt: 0.005,
            current_time: 0.5,
        };
        let plan = stage.plan_frame(time, seeds());
        assert_eq!(plan.spawn_budget, 1000);

        let kernels: Vec<Kernel> = plan.invocations().map(KernelInvocation::kernel).collect();
        assert_eq!(kernels, [Kernel::Spawn, Kernel::Update, Kernel::DeathCheck]);
        assert_eq!(
            plan.spawn.map(|s| s.args),
            Some(KernelArgs::Spawn {
                count: 1000,
                seed: 11,
                current_time: 0.5
            })
        );
        assert_eq!(plan.update.args, KernelArgs::Update { seed: 12, dt: 0.005 });
        assert!(plan.invocations().all(|inv| inv.work_items == 1_000_000));
    }

    #[test]
    fn test_zero_dt_skips_spawn() {
        let stage = ComputeStage::new(1_000_000, 200_000.0);
        let plan = stage.plan_frame(FrameTime::default(), seeds());
        assert_eq!(plan.spawn_budget, 0);
        assert!(plan.spawn.is_none());
        let kernels: Vec<Kernel> = plan.invocations().map(KernelInvocation::kernel).collect();
        assert_eq!(kernels, [Kernel::Update, Kernel::DeathCheck]);
    }
}
