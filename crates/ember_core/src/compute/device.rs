//! Compute-side device abstraction.

use crate::compute::KernelInvocation;
use crate::error::DeviceResult;

/// A device that owns the particle buffer's storage and can run the kernels
/// against it.
///
/// Implementations record dispatches and only make them visible on
/// [`finish_compute`](ParticleDevice::finish_compute). Callers never use this
/// trait directly inside the frame loop; they go through
/// [`SharedParticleBuffer`](crate::protocol::SharedParticleBuffer), which
/// enforces the ownership protocol around it.
pub trait ParticleDevice {
    /// Number of particle slots.
    fn capacity(&self) -> u32;

    /// Work-group size the kernels were built with.
    fn group_size(&self) -> u32;

    /// Blocks until all submitted graphics work that reads the buffer has
    /// completed.
    ///
    /// # Errors
    ///
    /// Fails if the device is lost while waiting.
    fn flush_graphics(&mut self) -> DeviceResult<()>;

    /// Records one kernel invocation.
    ///
    /// # Errors
    ///
    /// Fails if the invocation cannot be encoded (work size over the
    /// dispatch limit, unknown kernel, rejected arguments).
    fn dispatch(&mut self, invocation: &KernelInvocation) -> DeviceResult<()>;

    /// Submits everything recorded since the last finish and waits for it
    /// to complete.
    ///
    /// # Errors
    ///
    /// Fails if submission is rejected or the device is lost.
    fn finish_compute(&mut self) -> DeviceResult<()>;

    /// Discards everything recorded since the last finish.
    fn abandon_compute(&mut self);

    /// Waits until the device is idle.
    ///
    /// # Errors
    ///
    /// Fails if the device is lost while waiting.
    fn drain(&mut self) -> DeviceResult<()>;
}
