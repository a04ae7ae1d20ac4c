//! # Compute Stage
//!
//! The kernel pipeline over the shared buffer: init once, then
//! spawn → update → death check every frame.

mod device;
mod invocation;
mod stage;

pub use device::ParticleDevice;
pub use invocation::{
    spawn_budget, Kernel, KernelArgs, KernelInvocation, KernelParams, SimParams,
};
pub use stage::{ComputeStage, FramePlan};
