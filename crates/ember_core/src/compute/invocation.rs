//! # Kernel Invocations
//!
//! A [`KernelInvocation`] is everything one dispatch needs: which kernel,
//! its arguments, and how many work items. Invocations are plain values
//! rebuilt every frame; a device turns one into a parameter block plus a
//! dispatch of `ceil(work_items / group_size)` work-groups.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::config::SimulationConfig;

/// The four kernels of the particle program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Zero every slot. Runs once at startup.
    Init,
    /// Revive up to `count` dead slots.
    Spawn,
    /// Integrate live particles.
    Update,
    /// Kill expired or escaped particles.
    DeathCheck,
}

impl Kernel {
    /// Every kernel, in dispatch order.
    pub const ALL: [Kernel; 4] = [Kernel::Init, Kernel::Spawn, Kernel::Update, Kernel::DeathCheck];

    /// Entry point name in the kernel program.
    #[must_use]
    pub const fn entry_point(self) -> &'static str {
        match self {
            Kernel::Init => "initParticleState",
            Kernel::Spawn => "spawnParticle",
            Kernel::Update => "updateParticleState",
            Kernel::DeathCheck => "checkParticleDeath",
        }
    }

    /// Dense index, usable for per-kernel tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Kernel::Init => 0,
            Kernel::Spawn => 1,
            Kernel::Update => 2,
            Kernel::DeathCheck => 3,
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_point())
    }
}

/// Arguments of one kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArgs {
    /// `initParticleState(buffer)`
    Init,
    /// `spawnParticle(buffer, scratch, count, seed, currentTime)`
    Spawn {
        /// Maximum number of particles to revive.
        count: u32,
        /// Frame seed.
        seed: u64,
        /// Simulation time written into `spawn_time`.
        current_time: f32,
    },
    /// `updateParticleState(buffer, seed, dt)`
    Update {
        /// Frame seed for turbulence.
        seed: u64,
        /// Timestep in seconds.
        dt: f32,
    },
    /// `checkParticleDeath(buffer, currentTime)`
    DeathCheck {
        /// Simulation time compared against spawn time plus lifetime.
        current_time: f32,
    },
}

impl KernelArgs {
    /// The kernel these arguments belong to.
    #[must_use]
    pub const fn kernel(&self) -> Kernel {
        match self {
            KernelArgs::Init => Kernel::Init,
            KernelArgs::Spawn { .. } => Kernel::Spawn,
            KernelArgs::Update { .. } => Kernel::Update,
            KernelArgs::DeathCheck { .. } => Kernel::DeathCheck,
        }
    }
}

/// One dispatch over the particle buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelInvocation {
    /// Kernel arguments.
    pub args: KernelArgs,
    /// Global work size; one work item per particle slot.
    pub work_items: u32,
}

impl KernelInvocation {
    /// An invocation covering `capacity` slots.
    #[must_use]
    pub const fn new(args: KernelArgs, capacity: u32) -> Self {
        Self {
            args,
            work_items: capacity,
        }
    }

    /// The kernel to run.
    #[must_use]
    pub const fn kernel(&self) -> Kernel {
        self.args.kernel()
    }

    /// Work-groups needed at `group_size` invocations per group.
    #[must_use]
    pub const fn workgroups(&self, group_size: u32) -> u32 {
        self.work_items.div_ceil(group_size)
    }

    /// The uniform block the kernel reads its arguments from.
    #[must_use]
    pub fn params(&self) -> KernelParams {
        let mut params = KernelParams {
            particle_count: self.work_items,
            ..KernelParams::zeroed()
        };
        match self.args {
            KernelArgs::Init => {}
            KernelArgs::Spawn {
                count,
                seed,
                current_time,
            } => {
                params.spawn_count = count;
                params.set_seed(seed);
                params.current_time = current_time;
            }
            KernelArgs::Update { seed, dt } => {
                params.set_seed(seed);
                params.dt = dt;
            }
            KernelArgs::DeathCheck { current_time } => {
                params.current_time = current_time;
            }
        }
        params
    }
}

/// Per-invocation uniform block. Mirrors `KernelParams` in the kernel program.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    /// Slots in the buffer.
    pub particle_count: u32,
    /// Spawn budget (spawn only).
    pub spawn_count: u32,
    /// Low word of the frame seed (spawn, update).
    pub seed: u32,
    /// High word of the frame seed.
    pub seed_hi: u32,
    /// Simulation time (spawn, death check).
    pub current_time: f32,
    /// Timestep (update).
    pub dt: f32,
    /// Unused.
    pub _pad1: [f32; 2],
}

impl KernelParams {
    /// Splits a 64-bit frame seed into the two words of the block.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed as u32;
        self.seed_hi = (seed >> 32) as u32;
    }

    /// The 32-bit seed the kernels hash with. Equals `seed` while the high
    /// word is zero.
    #[must_use]
    pub fn frame_seed(&self) -> u32 {
        self.seed ^ self.seed_hi.wrapping_mul(0x9E37_79B9)
    }
}

/// Static simulation parameters shared by every kernel. Mirrors `SimParams`
/// in the kernel program; written once at startup.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SimParams {
    /// Emitter disc center.
    pub emitter_position: [f32; 3],
    /// Emitter disc radius.
    pub emitter_radius: f32,
    /// Mean launch velocity.
    pub launch_velocity: [f32; 3],
    /// Launch velocity spread.
    pub launch_spread: f32,
    /// Constant acceleration.
    pub gravity: [f32; 3],
    /// Random acceleration amplitude.
    pub turbulence: f32,
    /// Shortest lifetime.
    pub lifetime_min: f32,
    /// Longest lifetime.
    pub lifetime_max: f32,
    /// Kill radius around the emitter.
    pub bounds_radius: f32,
    /// Kill height.
    pub floor_height: f32,
    /// Velocity damping per second.
    pub drag: f32,
    /// Unused.
    pub _pad: [f32; 3],
}

impl SimParams {
    /// Builds the block from configuration.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            emitter_position: config.emitter.position,
            emitter_radius: config.emitter.radius,
            launch_velocity: config.emitter.launch_velocity,
            launch_spread: config.emitter.launch_spread,
            gravity: config.forces.gravity,
            turbulence: config.forces.turbulence,
            lifetime_min: config.emitter.lifetime_min,
            lifetime_max: config.emitter.lifetime_max,
            bounds_radius: config.bounds.radius,
            floor_height: config.bounds.floor,
            drag: config.forces.drag,
            _pad: [0.0; 3],
        }
    }
}

/// Particles to spawn this frame: `ceil(rate * dt)`, clamped to `[0, capacity]`.
///
/// The product is taken in `f64`. A zero, negative or non-finite product
/// spawns nothing.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn spawn_budget(rate: f32, dt: f32, capacity: u32) -> u32 {
    let product = f64::from(rate) * f64::from(dt);
    if !product.is_finite() || product <= 0.0 {
        return 0;
    }
    let budget = product.ceil();
    if budget >= f64::from(capacity) {
        capacity
    } else {
        budget as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_block_sizes() {
        assert_eq!(std::mem::size_of::<KernelParams>(), 32);
        assert_eq!(std::mem::size_of::<SimParams>(), 80);
    }

    #[test]
    fn test_spawn_budget() {
        assert_eq!(spawn_budget(200_000.0, 0.005, 1_000_000), 1000);
        assert_eq!(spawn_budget(200_000.0, 0.0, 1_000_000), 0);
        assert_eq!(spawn_budget(200_000.0, 1.0 / 60.0, 1_000_000), 3334);
        assert_eq!(spawn_budget(10.0, 0.01, 1_000_000), 1);
        assert_eq!(spawn_budget(200_000.0, 10.0, 1_000_000), 1_000_000);
        assert_eq!(spawn_budget(0.0, 0.5, 1_000_000), 0);
        assert_eq!(spawn_budget(200_000.0, -0.5, 1_000_000), 0);
        assert_eq!(spawn_budget(f32::INFINITY, 0.5, 1_000_000), 0);
    }

    #[test]
    fn test_spawn_budget_rounds_any_fraction_up() {
        assert_eq!(spawn_budget(1.0005, 1.0, 100), 2);
        assert_eq!(spawn_budget(1.0, 0.0009, 100), 1);
        assert_eq!(spawn_budget(1.0, 1e-7, 100), 1);
        assert_eq!(spawn_budget(4.0, 0.5, 100), 2);
    }

    #[test]
    fn test_seed_words() {
        let mut params = KernelParams::zeroed();
        params.set_seed(0x0000_0001_0000_0007);
        assert_eq!((params.seed, params.seed_hi), (7, 1));
        assert_ne!(params.frame_seed(), 7);

        params.set_seed(7);
        assert_eq!(params.frame_seed(), 7);

        let update = KernelInvocation::new(
            KernelArgs::Update {
                seed: u64::from(u32::MAX) + 2,
                dt: 0.1,
            },
            64,
        );
        assert_eq!((update.params().seed, update.params().seed_hi), (1, 1));
    }

    #[test]
    fn test_workgroups_round_up() {
        let inv = KernelInvocation::new(KernelArgs::Init, 1_000_000);
        assert_eq!(inv.workgroups(256), 3907);
        let exact = KernelInvocation::new(KernelArgs::Init, 512);
        assert_eq!(exact.workgroups(256), 2);
        let empty = KernelInvocation::new(KernelArgs::Init, 0);
        assert_eq!(empty.workgroups(256), 0);
    }

    #[test]
    fn test_params_carry_only_their_arguments() {
        let spawn = KernelInvocation::new(
            KernelArgs::Spawn {
                count: 12,
                seed: 99,
                current_time: 1.5,
            },
            1000,
        );
        let params = spawn.params();
        assert_eq!(params.particle_count, 1000);
        assert_eq!(params.spawn_count, 12);
        assert_eq!(params.seed, 99);
        assert_eq!(params.current_time, 1.5);
        assert_eq!(params.dt, 0.0);

        let update = KernelInvocation::new(KernelArgs::Update { seed: 3, dt: 0.25 }, 1000).params();
        assert_eq!(update.spawn_count, 0);
        assert_eq!(update.dt, 0.25);
    }

    #[test]
    fn test_entry_points() {
        let names: Vec<_> = Kernel::ALL.iter().map(|k| k.entry_point()).collect();
        assert_eq!(
            names,
            ["initParticleState", "spawnParticle", "updateParticleState", "checkParticleDeath"]
        );
        for (i, kernel) in Kernel::ALL.iter().enumerate() {
            assert_eq!(kernel.index(), i);
        }
    }
}
