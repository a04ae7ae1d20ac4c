//! Startup check that an adapter can host the shared buffer.

use crate::config::SimulationConfig;
use crate::error::SetupError;
use crate::particle::RecordLayout;

/// What an adapter reports about compute and buffer support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Compute shaders are available.
    pub compute_shaders: bool,
    /// A buffer may be bound as both storage and vertex input.
    pub storage_vertex_sharing: bool,
    /// Largest storage buffer binding in bytes.
    pub max_storage_binding: u64,
    /// Largest buffer in bytes.
    pub max_buffer_size: u64,
    /// Largest work-group size in x.
    pub max_workgroup_size_x: u32,
    /// Largest number of invocations per work-group.
    pub max_invocations_per_workgroup: u32,
    /// Largest work-group count per dispatch dimension.
    pub max_workgroups_per_dimension: u32,
}

/// What the shared buffer and kernels need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteropRequirements {
    /// Bytes of the shared buffer.
    pub buffer_size: u64,
    /// Kernel work-group size.
    pub group_size: u32,
    /// Work-groups per full-buffer dispatch.
    pub workgroups: u32,
}

impl InteropRequirements {
    /// Requirements implied by a configuration.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            buffer_size: RecordLayout::buffer_size(config.capacity),
            group_size: config.group_size,
            workgroups: config.capacity.div_ceil(config.group_size.max(1)),
        }
    }
}

impl DeviceCapabilities {
    /// Fails with [`SetupError::InteropUnsupported`] naming the first
    /// missing capability.
    ///
    /// # Errors
    ///
    /// See above; there is no degraded fallback.
    pub fn check(&self, needs: &InteropRequirements) -> Result<(), SetupError> {
        let missing = |reason: String| Err(SetupError::InteropUnsupported { reason });

        if !self.compute_shaders {
            return missing("adapter has no compute shader support".into());
        }
        if !self.storage_vertex_sharing {
            return missing("adapter cannot bind one buffer as storage and vertex input".into());
        }
        if needs.buffer_size > self.max_storage_binding {
            return missing(format!(
                "particle buffer of {} bytes exceeds storage binding limit of {} bytes",
                needs.buffer_size, self.max_storage_binding
            ));
        }
        if needs.buffer_size > self.max_buffer_size {
            return missing(format!(
                "particle buffer of {} bytes exceeds buffer size limit of {} bytes",
                needs.buffer_size, self.max_buffer_size
            ));
        }
        if needs.group_size > self.max_workgroup_size_x
            || needs.group_size > self.max_invocations_per_workgroup
        {
            return missing(format!(
                "work-group size {} exceeds device limit of {}",
                needs.group_size,
                self.max_workgroup_size_x.min(self.max_invocations_per_workgroup)
            ));
        }
        if needs.workgroups > self.max_workgroups_per_dimension {
            return missing(format!(
                "{} work-groups per dispatch exceed device limit of {}",
                needs.workgroups, self.max_workgroups_per_dimension
            ));
        }
        Ok(())
    }
}
