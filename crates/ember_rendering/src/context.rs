//! # GPU Context
//!
//! Adapter selection, the interop capability check and device creation.
//!
//! The check runs before the device is requested: an adapter that cannot
//! hold the whole particle buffer in one storage binding, or cannot run the
//! configured work-group size, is rejected with
//! [`SetupError::InteropUnsupported`]. There is no reduced mode.

use std::sync::Arc;

use ember_core::config::SimulationConfig;
use ember_core::error::{DeviceError, DeviceErrorKind, SetupError, SetupResult};
use ember_core::protocol::{DeviceCapabilities, InteropRequirements};

use crate::error_scope;

/// Backends tried for the adapter.
#[must_use]
pub fn backends() -> wgpu::Backends {
    #[cfg(target_os = "windows")]
    let backends = wgpu::Backends::DX12 | wgpu::Backends::VULKAN;
    #[cfg(not(target_os = "windows"))]
    let backends = wgpu::Backends::PRIMARY;
    backends
}

/// A fresh instance over [`backends`].
#[must_use]
pub fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: backends(),
        ..Default::default()
    })
}

/// Capabilities relevant to the shared buffer, from adapter limits and
/// downlevel flags.
#[must_use]
pub fn capabilities_from(limits: &wgpu::Limits, flags: wgpu::DownlevelFlags) -> DeviceCapabilities {
    let compute_shaders = flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);
    DeviceCapabilities {
        compute_shaders,
        // Any buffer may carry STORAGE | VERTEX once compute is available.
        storage_vertex_sharing: compute_shaders,
        max_storage_binding: u64::from(limits.max_storage_buffer_binding_size),
        max_buffer_size: limits.max_buffer_size,
        max_workgroup_size_x: limits.max_compute_workgroup_size_x,
        max_invocations_per_workgroup: limits.max_compute_invocations_per_workgroup,
        max_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
    }
}

/// Limits to request: the defaults, raised to what the buffer and kernels
/// need. Only called after [`DeviceCapabilities::check`] passed.
#[must_use]
pub fn required_limits(needs: &InteropRequirements) -> wgpu::Limits {
    let defaults = wgpu::Limits::default();
    let binding = u32::try_from(needs.buffer_size).unwrap_or(u32::MAX);
    wgpu::Limits {
        max_storage_buffer_binding_size: defaults.max_storage_buffer_binding_size.max(binding),
        max_buffer_size: defaults.max_buffer_size.max(needs.buffer_size),
        max_compute_workgroup_size_x: defaults.max_compute_workgroup_size_x.max(needs.group_size),
        max_compute_invocations_per_workgroup: defaults
            .max_compute_invocations_per_workgroup
            .max(needs.group_size),
        max_compute_workgroups_per_dimension: defaults
            .max_compute_workgroups_per_dimension
            .max(needs.workgroups),
        ..defaults
    }
}

/// Adapter, device and queue shared by the compute and graphics sides.
pub struct GpuContext {
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    capabilities: DeviceCapabilities,
}

impl GpuContext {
    /// Picks an adapter able to present to `surface`, checks it can host the
    /// shared buffer and opens a device on it.
    ///
    /// # Errors
    ///
    /// - [`SetupError::NoAdapter`] if no adapter matches
    /// - [`SetupError::InteropUnsupported`] if the adapter lacks a capability
    /// - [`SetupError::Device`] if the device request fails
    pub fn new(
        instance: &wgpu::Instance,
        surface: &wgpu::Surface<'_>,
        config: &SimulationConfig,
    ) -> SetupResult<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(surface),
            force_fallback_adapter: false,
        }))
        .ok_or(SetupError::NoAdapter)?;

        let info = adapter.get_info();
        tracing::info!(
            name = %info.name,
            vendor = format_args!("{:#06x}", info.vendor),
            device = format_args!("{:#06x}", info.device),
            backend = ?info.backend,
            driver = %info.driver,
            driver_info = %info.driver_info,
            "graphics adapter selected"
        );

        let capabilities =
            capabilities_from(&adapter.limits(), adapter.get_downlevel_capabilities().flags);
        let needs = InteropRequirements::from_config(config);
        capabilities.check(&needs)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("ember.device"),
                required_features: wgpu::Features::empty(),
                required_limits: required_limits(&needs),
            },
            None,
        ))
        .map_err(|err| {
            DeviceError::new("request_device", DeviceErrorKind::DeviceNotAvailable, err.to_string())
        })?;
        error_scope::install_uncaptured_handler(&device);

        tracing::info!(
            buffer_bytes = needs.buffer_size,
            group_size = needs.group_size,
            workgroups = needs.workgroups,
            "device ready for shared particle buffer"
        );

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            capabilities,
        })
    }

    /// The selected adapter.
    #[must_use]
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Shared device handle.
    #[must_use]
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Shared queue handle.
    #[must_use]
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// What the adapter reported.
    #[must_use]
    pub fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn needs(capacity: u32, group_size: u32) -> InteropRequirements {
        InteropRequirements::from_config(&SimulationConfig {
            capacity,
            group_size,
            ..SimulationConfig::default()
        })
    }

    #[test]
    fn test_default_limits_reject_full_buffer() {
        // The default 128 MiB storage binding holds about two million slots.
        let caps = capabilities_from(&wgpu::Limits::default(), wgpu::DownlevelFlags::all());
        assert!(caps.check(&needs(1_000_000, 256)).is_ok());
        let err = caps.check(&needs(4_000_000, 256)).unwrap_err();
        assert!(matches!(err, SetupError::InteropUnsupported { .. }));
    }

    #[test]
    fn test_no_compute_is_unsupported() {
        let caps = capabilities_from(&wgpu::Limits::default(), wgpu::DownlevelFlags::empty());
        assert!(!caps.compute_shaders);
        assert!(caps.check(&needs(1024, 64)).is_err());
    }

    #[test]
    fn test_required_limits_cover_needs() {
        let needs = needs(4_000_000, 1024);
        let limits = required_limits(&needs);
        assert!(u64::from(limits.max_storage_buffer_binding_size) >= needs.buffer_size);
        assert!(limits.max_buffer_size >= needs.buffer_size);
        assert_eq!(limits.max_compute_workgroup_size_x, 1024);
        assert_eq!(limits.max_compute_invocations_per_workgroup, 1024);

        let small = required_limits(&InteropRequirements {
            buffer_size: 64,
            group_size: 1,
            workgroups: 1,
        });
        assert_eq!(
            small.max_compute_workgroup_size_x,
            wgpu::Limits::default().max_compute_workgroup_size_x
        );
    }
}
