//! # Host Reference Device
//!
//! A [`ParticleDevice`] backed by a `Vec<ParticleRecord>`. It runs the same
//! kernel math as the WGSL program, records dispatches until
//! `finish_compute` like a command encoder, and keeps the alive count after
//! every phase so tests can check the frame invariants without a GPU.

pub mod kernels;

use crate::compute::{Kernel, KernelArgs, KernelInvocation, ParticleDevice, SimParams};
use crate::config::SimulationConfig;
use crate::error::{DeviceError, DeviceErrorKind, DeviceResult};
use crate::particle::ParticleRecord;

/// Dispatch limit per dimension every backend must support.
pub const DEFAULT_MAX_WORKGROUPS: u32 = 65_535;

/// Alive counts observed during the last submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseCounts {
    /// Alive before the first kernel ran.
    pub before: u32,
    /// Alive after spawn, if spawn ran.
    pub after_spawn: Option<u32>,
    /// Alive after update, if update ran.
    pub after_update: Option<u32>,
    /// Alive after death check, if it ran.
    pub after_death_check: Option<u32>,
    /// Particles spawned.
    pub spawned: u32,
    /// Particles killed.
    pub killed: u32,
}

/// Activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostDeviceStats {
    /// Graphics flushes requested.
    pub flushes: u64,
    /// Submissions executed.
    pub submissions: u64,
    /// Kernels executed.
    pub kernels_executed: u64,
    /// Recorded kernels thrown away by an abandoned scope.
    pub kernels_abandoned: u64,
    /// Full drains.
    pub drains: u64,
}

/// CPU implementation of the particle kernels.
#[derive(Debug, Clone)]
pub struct HostDevice {
    records: Vec<ParticleRecord>,
    group_size: u32,
    max_workgroups: u32,
    sim: SimParams,
    pending: Vec<KernelInvocation>,
    alive: u32,
    last_counts: PhaseCounts,
    stats: HostDeviceStats,
    fault: Option<DeviceErrorKind>,
}

/// Contents of freshly allocated storage: flagged alive so a missing Init
/// shows up immediately.
const GARBAGE: ParticleRecord = ParticleRecord {
    position: [f32::NAN; 3],
    spawn_time: 0.0,
    alive: 0xAA,
    alive_pad: [0; 3],
    lifetime: f32::MAX,
    _pad0: [0.0; 2],
    velocity: [0.0; 3],
    seed: 0xDEAD_BEEF,
    scratch: [0.0; 4],
};

impl HostDevice {
    /// Allocates `capacity` slots of uninitialised storage.
    ///
    /// # Errors
    ///
    /// Fails on a zero capacity or a group size that is not a power of two.
    pub fn new(capacity: u32, group_size: u32, sim: SimParams) -> DeviceResult<Self> {
        if capacity == 0 {
            return Err(DeviceError::new(
                "allocate particle buffer",
                DeviceErrorKind::InvalidBufferSize,
                "capacity is zero",
            ));
        }
        if !group_size.is_power_of_two() {
            return Err(DeviceError::new(
                "build kernels",
                DeviceErrorKind::InvalidWorkGroupSize,
                format!("group size {group_size} is not a power of two"),
            ));
        }
        Ok(Self {
            records: vec![GARBAGE; capacity as usize],
            group_size,
            max_workgroups: DEFAULT_MAX_WORKGROUPS,
            sim,
            pending: Vec::with_capacity(4),
            alive: capacity,
            last_counts: PhaseCounts::default(),
            stats: HostDeviceStats::default(),
            fault: None,
        })
    }

    /// A device sized and parameterised from configuration.
    ///
    /// # Errors
    ///
    /// See [`HostDevice::new`].
    pub fn from_config(config: &SimulationConfig) -> DeviceResult<Self> {
        Self::new(config.capacity, config.group_size, SimParams::from_config(config))
    }

    /// Lowers the work-group count limit, to exercise dispatch validation.
    #[must_use]
    pub fn with_max_workgroups(mut self, max_workgroups: u32) -> Self {
        self.max_workgroups = max_workgroups;
        self
    }

    /// Makes the next `dispatch` fail with `kind`.
    pub fn inject_dispatch_fault(&mut self, kind: DeviceErrorKind) {
        self.fault = Some(kind);
    }

    /// Buffer contents.
    #[must_use]
    pub fn records(&self) -> &[ParticleRecord] {
        &self.records
    }

    /// Alive count tracked from kernel results.
    #[must_use]
    pub fn alive(&self) -> u32 {
        self.alive
    }

    /// Alive count by scanning every slot.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn count_alive(&self) -> u32 {
        self.records.iter().filter(|r| r.is_alive()).count() as u32
    }

    /// Counts from the last submission.
    #[must_use]
    pub fn last_counts(&self) -> PhaseCounts {
        self.last_counts
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> HostDeviceStats {
        self.stats
    }

    /// Kernels recorded but not yet submitted.
    #[must_use]
    pub fn pending(&self) -> &[KernelInvocation] {
        &self.pending
    }

    fn execute(&mut self, invocation: &KernelInvocation) {
        let params = invocation.params();
        match invocation.args {
            KernelArgs::Init => {
                kernels::init(&mut self.records, &params);
                self.alive = self.count_alive();
            }
            KernelArgs::Spawn { .. } => {
                let spawned = kernels::spawn(&mut self.records, &params, &self.sim, self.group_size);
                self.alive += spawned;
                self.last_counts.spawned += spawned;
                self.last_counts.after_spawn = Some(self.alive);
            }
            KernelArgs::Update { .. } => {
                kernels::update(&mut self.records, &params, &self.sim);
                self.last_counts.after_update = Some(self.alive);
            }
            KernelArgs::DeathCheck { .. } => {
                let killed = kernels::death_check(&mut self.records, &params, &self.sim);
                self.alive -= killed;
                self.last_counts.killed += killed;
                self.last_counts.after_death_check = Some(self.alive);
            }
        }
        self.stats.kernels_executed += 1;
    }
}

impl ParticleDevice for HostDevice {
    #[allow(clippy::cast_possible_truncation)]
    fn capacity(&self) -> u32 {
        self.records.len() as u32
    }

    fn group_size(&self) -> u32 {
        self.group_size
    }

    fn flush_graphics(&mut self) -> DeviceResult<()> {
        self.stats.flushes += 1;
        Ok(())
    }

    fn dispatch(&mut self, invocation: &KernelInvocation) -> DeviceResult<()> {
        let kernel = invocation.kernel();
        let operation = || format!("dispatch({kernel})");

        if let Some(kind) = self.fault.take() {
            return Err(DeviceError::new(operation(), kind, "injected fault"));
        }
        if invocation.work_items > self.capacity() {
            return Err(DeviceError::new(
                operation(),
                DeviceErrorKind::InvalidGlobalWorkSize,
                format!("{} work items for {} slots", invocation.work_items, self.capacity()),
            ));
        }
        let groups = invocation.workgroups(self.group_size);
        if groups > self.max_workgroups {
            return Err(DeviceError::new(
                operation(),
                DeviceErrorKind::InvalidGlobalWorkSize,
                format!("{groups} work-groups exceed limit of {}", self.max_workgroups),
            ));
        }
        if let KernelArgs::Spawn { count, .. } = invocation.args {
            if count > self.capacity() || count == 0 {
                return Err(DeviceError::new(
                    operation(),
                    DeviceErrorKind::InvalidKernelArgs,
                    format!("spawn count {count} outside 1..={}", self.capacity()),
                ));
            }
        }
        if kernel == Kernel::Init && !self.pending.is_empty() {
            return Err(DeviceError::new(
                operation(),
                DeviceErrorKind::InvalidOperation,
                "init must be the only kernel of its submission",
            ));
        }
        self.pending.push(*invocation);
        Ok(())
    }

    fn finish_compute(&mut self) -> DeviceResult<()> {
        let pending = std::mem::take(&mut self.pending);
        self.last_counts = PhaseCounts {
            before: self.alive,
            ..PhaseCounts::default()
        };
        for invocation in &pending {
            self.execute(invocation);
        }
        self.pending = pending;
        self.pending.clear();
        self.stats.submissions += 1;
        Ok(())
    }

    fn abandon_compute(&mut self) {
        self.stats.kernels_abandoned += self.pending.len() as u64;
        self.pending.clear();
    }

    fn drain(&mut self) -> DeviceResult<()> {
        self.stats.drains += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(capacity: u32) -> HostDevice {
        let config = SimulationConfig {
            capacity,
            ..SimulationConfig::default()
        };
        HostDevice::from_config(&config).unwrap()
    }

    #[test]
    fn test_storage_is_garbage_until_init() {
        let mut dev = device(1000);
        assert_eq!(dev.count_alive(), 1000);

        dev.dispatch(&KernelInvocation::new(KernelArgs::Init, 1000)).unwrap();
        // Recorded, not yet executed.
        assert_eq!(dev.count_alive(), 1000);
        dev.finish_compute().unwrap();

        assert_eq!(dev.count_alive(), 0);
        assert_eq!(dev.alive(), 0);
        assert!(dev.records().iter().all(|r| *r == ParticleRecord::dead()));
    }

    #[test]
    fn test_abandon_discards_recorded_kernels() {
        let mut dev = device(100);
        dev.dispatch(&KernelInvocation::new(KernelArgs::Init, 100)).unwrap();
        dev.abandon_compute();
        dev.finish_compute().unwrap();
        assert_eq!(dev.count_alive(), 100);
        assert_eq!(dev.stats().kernels_abandoned, 1);
    }

    #[test]
    fn test_dispatch_validation() {
        let mut dev = device(1024).with_max_workgroups(2);
        let err = dev
            .dispatch(&KernelInvocation::new(KernelArgs::Init, 1024))
            .unwrap_err();
        assert_eq!(err.kind(), DeviceErrorKind::InvalidGlobalWorkSize);
        assert_eq!(err.operation(), "dispatch(initParticleState)");

        let mut dev = device(16);
        let err = dev
            .dispatch(&KernelInvocation::new(
                KernelArgs::Spawn {
                    count: 17,
                    seed: 1,
                    current_time: 0.0,
                },
                16,
            ))
            .unwrap_err();
        assert_eq!(err.kind(), DeviceErrorKind::InvalidKernelArgs);

        dev.inject_dispatch_fault(DeviceErrorKind::OutOfMemory);
        let err = dev
            .dispatch(&KernelInvocation::new(KernelArgs::Init, 16))
            .unwrap_err();
        assert_eq!(err.kind(), DeviceErrorKind::OutOfMemory);
        // Faults fire once.
        assert!(dev.dispatch(&KernelInvocation::new(KernelArgs::Init, 16)).is_ok());
    }

    #[test]
    fn test_phase_counts_track_spawn_and_death() {
        let mut dev = device(512);
        dev.dispatch(&KernelInvocation::new(KernelArgs::Init, 512)).unwrap();
        dev.finish_compute().unwrap();

        dev.dispatch(&KernelInvocation::new(
            KernelArgs::Spawn {
                count: 100,
                seed: 9,
                current_time: 0.0,
            },
            512,
        ))
        .unwrap();
        dev.dispatch(&KernelInvocation::new(KernelArgs::Update { seed: 10, dt: 0.01 }, 512))
            .unwrap();
        dev.dispatch(&KernelInvocation::new(KernelArgs::DeathCheck { current_time: 0.01 }, 512))
            .unwrap();
        dev.finish_compute().unwrap();

        let counts = dev.last_counts();
        assert_eq!(counts.before, 0);
        assert_eq!(counts.spawned, 100);
        assert_eq!(counts.after_spawn, Some(100));
        assert_eq!(counts.after_update, Some(100));
        assert_eq!(counts.after_death_check, Some(100 - counts.killed));
        assert_eq!(dev.alive(), dev.count_alive());
    }
}
