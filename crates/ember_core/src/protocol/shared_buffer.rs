//! # Shared Particle Buffer
//!
//! Single owner of the particle storage. Access goes through two guards:
//!
//! - [`ComputeScope`]: exclusive compute access between acquire and
//!   release. Kernels can only be recorded through it.
//! - [`GraphicsAccess`]: read access for one draw.
//!
//! Both borrow the buffer mutably, so the compiler already rules out
//! overlapping guards; the [`OwnershipJournal`] checks the same rules at
//! runtime and counts transitions for instrumentation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut scope = buffer.acquire_for_compute()?;   // waits for graphics
//! scope.dispatch(&plan.update)?;
//! scope.release()?;                                 // submit + wait
//!
//! let access = buffer.begin_draw()?;
//! renderer.draw(&access, &view)?;
//! drop(access);
//! ```

use crate::compute::{KernelInvocation, ParticleDevice};
use crate::error::FrameResult;
use crate::protocol::{BufferOwner, OwnershipEvent, OwnershipJournal, ProtocolViolation};

/// The particle buffer and the device that owns its storage.
#[derive(Debug)]
pub struct SharedParticleBuffer<D: ParticleDevice> {
    device: D,
    journal: OwnershipJournal,
}

impl<D: ParticleDevice> SharedParticleBuffer<D> {
    /// Wraps a device whose buffer is idle.
    #[must_use]
    pub fn new(device: D) -> Self {
        tracing::debug!(
            capacity = device.capacity(),
            group_size = device.group_size(),
            "shared particle buffer ready"
        );
        Self {
            device,
            journal: OwnershipJournal::new(),
        }
    }

    /// Current owner.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> BufferOwner {
        self.journal.owner()
    }

    /// Transition journal.
    #[must_use]
    pub fn journal(&self) -> &OwnershipJournal {
        &self.journal
    }

    /// Number of particle slots.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.device.capacity()
    }

    /// The underlying device. Only shared access; mutation goes through the
    /// guards.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[cfg(test)]
    pub(crate) fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Takes the buffer for compute.
    ///
    /// Blocks until graphics work reading the buffer has finished.
    ///
    /// # Errors
    ///
    /// Fails if the buffer is not idle or the flush fails.
    pub fn acquire_for_compute(&mut self) -> FrameResult<ComputeScope<'_, D>> {
        match self.owner() {
            BufferOwner::Idle => {}
            BufferOwner::Compute => return Err(ProtocolViolation::DoubleAcquire.into()),
            BufferOwner::Graphics => return Err(ProtocolViolation::AcquireWhileDrawing.into()),
        }
        self.device.flush_graphics()?;
        self.journal.record(OwnershipEvent::Acquire)?;
        tracing::trace!("particle buffer acquired for compute");
        Ok(ComputeScope {
            buffer: self,
            released: false,
        })
    }

    /// Lends the buffer to graphics for one draw.
    ///
    /// # Errors
    ///
    /// Fails if compute owns the buffer.
    pub fn begin_draw(&mut self) -> Result<GraphicsAccess<'_, D>, ProtocolViolation> {
        self.journal.record(OwnershipEvent::DrawBegin)?;
        Ok(GraphicsAccess { buffer: self })
    }

    /// Waits until no device work is in flight.
    ///
    /// # Errors
    ///
    /// Fails if the device is lost while waiting.
    pub fn drain(&mut self) -> FrameResult<()> {
        self.device.drain()?;
        Ok(())
    }

    /// Drains the device and returns it.
    ///
    /// # Errors
    ///
    /// Fails if the drain fails.
    pub fn into_device(mut self) -> FrameResult<D> {
        self.drain()?;
        Ok(self.device)
    }
}

/// Exclusive compute access to the buffer.
///
/// Dropping the scope without [`release`](ComputeScope::release) discards
/// the recorded kernels and still returns the buffer to idle.
#[derive(Debug)]
pub struct ComputeScope<'a, D: ParticleDevice> {
    buffer: &'a mut SharedParticleBuffer<D>,
    released: bool,
}

impl<D: ParticleDevice> ComputeScope<'_, D> {
    /// Records one kernel invocation.
    ///
    /// # Errors
    ///
    /// Fails if the device rejects the invocation.
    pub fn dispatch(&mut self, invocation: &KernelInvocation) -> FrameResult<()> {
        self.buffer
            .journal
            .record(OwnershipEvent::Dispatch(invocation.kernel()))?;
        self.buffer.device.dispatch(invocation)?;
        tracing::trace!(kernel = %invocation.kernel(), work_items = invocation.work_items, "kernel recorded");
        Ok(())
    }

    /// The underlying device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.buffer.device
    }

    /// Submits the recorded kernels, waits for them, and returns the buffer
    /// to idle.
    ///
    /// # Errors
    ///
    /// Fails if submission or the wait fails. Ownership is returned either
    /// way.
    pub fn release(mut self) -> FrameResult<()> {
        self.released = true;
        let finished = self.buffer.device.finish_compute();
        self.buffer.journal.record(OwnershipEvent::Release)?;
        tracing::trace!("particle buffer released to graphics");
        finished?;
        Ok(())
    }
}

impl<D: ParticleDevice> Drop for ComputeScope<'_, D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.buffer.device.abandon_compute();
        if let Err(violation) = self.buffer.journal.record(OwnershipEvent::Abandon) {
            tracing::error!(%violation, "compute scope dropped in an inconsistent state");
        }
        tracing::warn!("compute scope dropped without release; recorded kernels discarded");
    }
}

/// Read access to the buffer for one draw.
#[derive(Debug)]
pub struct GraphicsAccess<'a, D: ParticleDevice> {
    buffer: &'a mut SharedParticleBuffer<D>,
}

impl<D: ParticleDevice> GraphicsAccess<'_, D> {
    /// The device holding the buffer storage.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.buffer.device
    }

    /// Owner as seen by the journal; `Graphics` for as long as this lives.
    #[must_use]
    pub fn owner(&self) -> BufferOwner {
        self.buffer.owner()
    }

    /// Particles to draw: every slot, alive or not.
    #[must_use]
    pub fn draw_count(&self) -> u32 {
        self.buffer.capacity()
    }
}

impl<D: ParticleDevice> Drop for GraphicsAccess<'_, D> {
    fn drop(&mut self) {
        if let Err(violation) = self.buffer.journal.record(OwnershipEvent::DrawEnd) {
            tracing::error!(%violation, "graphics access ended in an inconsistent state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{Kernel, KernelArgs};
    use crate::config::SimulationConfig;
    use crate::error::{DeviceErrorKind, FrameError};
    use crate::host::HostDevice;

    fn buffer(capacity: u32) -> SharedParticleBuffer<HostDevice> {
        let config = SimulationConfig {
            capacity,
            ..SimulationConfig::default()
        };
        SharedParticleBuffer::new(HostDevice::from_config(&config).unwrap())
    }

    #[test]
    fn test_acquire_release_cycle() {
        let mut buffer = buffer(256);
        assert_eq!(buffer.owner(), BufferOwner::Idle);

        let mut scope = buffer.acquire_for_compute().unwrap();
        scope.dispatch(&KernelInvocation::new(KernelArgs::Init, 256)).unwrap();
        assert_eq!(scope.device().pending().len(), 1);
        scope.release().unwrap();

        assert_eq!(buffer.owner(), BufferOwner::Idle);
        assert_eq!(buffer.device().count_alive(), 0);
        assert_eq!(buffer.device().stats().flushes, 1);

        let access = buffer.begin_draw().unwrap();
        assert_eq!(access.owner(), BufferOwner::Graphics);
        assert_eq!(access.draw_count(), 256);
        drop(access);

        let counts = buffer.journal().counts();
        assert_eq!((counts.acquires, counts.releases, counts.draws), (1, 1, 1));
        assert!(OwnershipJournal::verify(buffer.journal().history()).is_ok());
    }

    #[test]
    fn test_dropped_scope_releases_on_error_path() {
        fn failing_frame(buffer: &mut SharedParticleBuffer<HostDevice>) -> FrameResult<()> {
            let mut scope = buffer.acquire_for_compute()?;
            scope.dispatch(&KernelInvocation::new(KernelArgs::Init, 64))?;
            scope.dispatch(&KernelInvocation::new(KernelArgs::Update { seed: 1, dt: 0.1 }, 64))?;
            scope.release()
        }

        let mut buffer = buffer(64);
        buffer.device.inject_dispatch_fault(DeviceErrorKind::DeviceLost);
        let err = failing_frame(&mut buffer).unwrap_err();
        assert!(matches!(err, FrameError::Device(ref e) if e.kind() == DeviceErrorKind::DeviceLost));

        assert_eq!(buffer.owner(), BufferOwner::Idle);
        assert_eq!(buffer.journal().counts().abandons, 1);
        assert!(buffer.device().pending().is_empty());
        // Graphics may proceed after the failed frame.
        assert!(buffer.begin_draw().is_ok());
    }

    #[test]
    fn test_abandoned_scope_discards_work() {
        let mut buffer = buffer(64);
        {
            let mut scope = buffer.acquire_for_compute().unwrap();
            scope.dispatch(&KernelInvocation::new(KernelArgs::Init, 64)).unwrap();
        }
        assert_eq!(buffer.device().count_alive(), 64);
        assert_eq!(buffer.device().stats().kernels_abandoned, 1);
        assert_eq!(
            buffer.journal().history().copied().collect::<Vec<_>>(),
            [
                OwnershipEvent::Acquire,
                OwnershipEvent::Dispatch(Kernel::Init),
                OwnershipEvent::Abandon
            ]
        );
    }
}
