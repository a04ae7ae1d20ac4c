//! # GPU Particle Device
//!
//! Compute side of the shared buffer. Owns the particle storage, one uniform
//! block per kernel, the static simulation block and the spawn ticket
//! counter. Each dispatch is encoded into its own command buffer, so an
//! encoding failure names its kernel; the buffers of one compute scope are
//! submitted together on release.
//!
//! ```text
//! group 0 ─┬─ binding 0: particles      storage, read_write   (also VERTEX)
//!          ├─ binding 1: KernelParams   uniform, per kernel
//!          ├─ binding 2: SimParams      uniform, shared
//!          └─ binding 3: SpawnCounter   storage, read_write
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use ember_core::compute::{Kernel, KernelArgs, KernelInvocation, ParticleDevice, SimParams};
use ember_core::config::SimulationConfig;
use ember_core::error::{DeviceError, DeviceErrorKind, DeviceResult, SetupError, SetupResult};
use ember_core::particle::RecordLayout;
use wgpu::util::DeviceExt;

use crate::context::GpuContext;
use crate::error_scope;
use crate::shaders::ShaderSources;

/// Bytes of the spawn ticket counter (one atomic plus padding).
const SPAWN_COUNTER_SIZE: u64 = 16;

/// Particle storage and kernel pipelines on a `wgpu` device.
pub struct GpuParticleDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    capacity: u32,
    group_size: u32,
    max_workgroups: u32,
    particles: wgpu::Buffer,
    kernel_params: [wgpu::Buffer; 4],
    _sim_params: wgpu::Buffer,
    spawn_counter: wgpu::Buffer,
    bind_groups: [wgpu::BindGroup; 4],
    pipelines: [wgpu::ComputePipeline; 4],
    recorded: Vec<(Kernel, wgpu::CommandBuffer)>,
}

impl GpuParticleDevice {
    /// Allocates the particle buffer and builds the four kernel pipelines.
    ///
    /// The storage is uninitialised until the init kernel runs.
    ///
    /// # Errors
    ///
    /// - [`SetupError::ProgramBuild`] if the kernel program does not compile
    /// - [`SetupError::Device`] if allocation or pipeline creation fails
    pub fn new(
        context: &GpuContext,
        config: &SimulationConfig,
        sources: &ShaderSources,
    ) -> SetupResult<Self> {
        let device = Arc::clone(context.device());
        let queue = Arc::clone(context.queue());
        let capacity = config.capacity;
        let buffer_size = RecordLayout::buffer_size(capacity);

        let particles = create_buffer(
            &device,
            &wgpu::BufferDescriptor {
                label: Some("ember.particles"),
                size: buffer_size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            },
        )?;
        tracing::info!(
            capacity,
            bytes = buffer_size,
            stride = RecordLayout::STRIDE,
            "shared particle buffer allocated"
        );

        let [init, spawn, update, death_check] = Kernel::ALL.map(|kernel| {
            create_buffer(
                &device,
                &wgpu::BufferDescriptor {
                    label: Some(kernel.entry_point()),
                    size: std::mem::size_of::<ember_core::KernelParams>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                },
            )
        });
        let kernel_params = [init?, spawn?, update?, death_check?];

        error_scope::push(&device);
        let sim_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ember.sim_params"),
            contents: bytemuck::bytes_of(&SimParams::from_config(config)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        error_scope::check(&device, "create_buffer(ember.sim_params)")?;

        let spawn_counter = create_buffer(
            &device,
            &wgpu::BufferDescriptor {
                label: Some("ember.spawn_counter"),
                size: SPAWN_COUNTER_SIZE,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            },
        )?;

        error_scope::push(&device);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ember.kernels"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(sources.kernels.as_str())),
        });
        if let Some(err) = error_scope::pop(&device) {
            return Err(SetupError::ProgramBuild {
                program: "particle kernels".to_owned(),
                log: err.to_string(),
            });
        }

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ember.kernels.bgl"),
            entries: &[
                storage_entry(0),
                uniform_entry(1),
                uniform_entry(2),
                storage_entry(3),
            ],
        });
        let bind_groups = Kernel::ALL.map(|kernel| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(kernel.entry_point()),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: particles.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: kernel_params[kernel.index()].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: sim_params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: spawn_counter.as_entire_binding(),
                    },
                ],
            })
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ember.kernels.pl"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipelines = [
            build_pipeline(&device, &pipeline_layout, &module, Kernel::Init)?,
            build_pipeline(&device, &pipeline_layout, &module, Kernel::Spawn)?,
            build_pipeline(&device, &pipeline_layout, &module, Kernel::Update)?,
            build_pipeline(&device, &pipeline_layout, &module, Kernel::DeathCheck)?,
        ];
        tracing::info!(group_size = config.group_size, "kernel pipelines built");

        Ok(Self {
            device,
            queue,
            capacity,
            group_size: config.group_size,
            max_workgroups: context.capabilities().max_workgroups_per_dimension,
            particles,
            kernel_params,
            _sim_params: sim_params,
            spawn_counter,
            bind_groups,
            pipelines,
            recorded: Vec::with_capacity(Kernel::ALL.len()),
        })
    }

    /// The particle storage. Reachable by the renderer only through
    /// [`GraphicsAccess::device`](ember_core::protocol::GraphicsAccess::device).
    #[must_use]
    pub fn particle_buffer(&self) -> &wgpu::Buffer {
        &self.particles
    }

    fn check_invocation(&self, invocation: &KernelInvocation) -> DeviceResult<u32> {
        let kernel = invocation.kernel();
        if invocation.work_items == 0 || invocation.work_items > self.capacity {
            return Err(DeviceError::new(
                kernel.entry_point(),
                DeviceErrorKind::InvalidKernelArgs,
                format!("{} work items for {} slots", invocation.work_items, self.capacity),
            ));
        }
        if let KernelArgs::Spawn { count, .. } = invocation.args {
            if count == 0 || count > self.capacity {
                return Err(DeviceError::new(
                    kernel.entry_point(),
                    DeviceErrorKind::InvalidKernelArgs,
                    format!("spawn count {count} outside 1..={}", self.capacity),
                ));
            }
        }
        let workgroups = invocation.workgroups(self.group_size);
        if workgroups > self.max_workgroups {
            return Err(DeviceError::new(
                kernel.entry_point(),
                DeviceErrorKind::InvalidGlobalWorkSize,
                format!("{workgroups} work-groups exceed limit of {}", self.max_workgroups),
            ));
        }
        Ok(workgroups)
    }
}

impl ParticleDevice for GpuParticleDevice {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn group_size(&self) -> u32 {
        self.group_size
    }

    fn flush_graphics(&mut self) -> DeviceResult<()> {
        wait(&self.device, wgpu::Maintain::Wait);
        Ok(())
    }

    fn dispatch(&mut self, invocation: &KernelInvocation) -> DeviceResult<()> {
        let workgroups = self.check_invocation(invocation)?;
        let kernel = invocation.kernel();
        let index = kernel.index();

        self.queue.write_buffer(
            &self.kernel_params[index],
            0,
            bytemuck::bytes_of(&invocation.params()),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kernel.entry_point()),
            });
        if kernel == Kernel::Spawn {
            encoder.clear_buffer(&self.spawn_counter, 0, None);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines[index]);
            pass.set_bind_group(0, &self.bind_groups[index], &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }

        error_scope::push(&self.device);
        let commands = encoder.finish();
        error_scope::check(&self.device, &dispatch_operation(kernel))?;

        self.recorded.push((kernel, commands));
        Ok(())
    }

    fn finish_compute(&mut self) -> DeviceResult<()> {
        if self.recorded.is_empty() {
            return Ok(());
        }
        let (kernels, commands): (Vec<Kernel>, Vec<wgpu::CommandBuffer>) =
            self.recorded.drain(..).unzip();
        let operation = submit_operation(&kernels);

        error_scope::push(&self.device);
        let submission = self.queue.submit(commands);
        error_scope::check(&self.device, &operation)?;

        wait(&self.device, wgpu::Maintain::WaitForSubmissionIndex(submission));
        tracing::trace!(%operation, "compute submission complete");
        Ok(())
    }

    fn abandon_compute(&mut self) {
        if !self.recorded.is_empty() {
            tracing::debug!(kernels = self.recorded.len(), "discarded recorded kernels");
            self.recorded.clear();
        }
    }

    fn drain(&mut self) -> DeviceResult<()> {
        wait(&self.device, wgpu::Maintain::Wait);
        Ok(())
    }
}

/// `dispatch(<entry point>)`.
fn dispatch_operation(kernel: Kernel) -> String {
    format!("dispatch({})", kernel.entry_point())
}

/// `queue_submit(<entry points in submission order>)`.
fn submit_operation(kernels: &[Kernel]) -> String {
    let names: Vec<&str> = kernels.iter().map(|kernel| kernel.entry_point()).collect();
    format!("queue_submit({})", names.join(", "))
}

/// Creates a buffer inside an error scope, so allocation failures come back
/// as `create_buffer(<label>)` errors.
#[track_caller]
fn create_buffer(
    device: &wgpu::Device,
    descriptor: &wgpu::BufferDescriptor<'_>,
) -> DeviceResult<wgpu::Buffer> {
    error_scope::push(device);
    let buffer = device.create_buffer(descriptor);
    let label = descriptor.label.unwrap_or("unlabelled");
    error_scope::check(device, &format!("create_buffer({label})"))?;
    Ok(buffer)
}

fn wait(device: &wgpu::Device, maintain: wgpu::Maintain) {
    let queue_empty = device.poll(maintain).is_queue_empty();
    tracing::trace!(queue_empty, "device poll returned");
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    kernel: Kernel,
) -> SetupResult<wgpu::ComputePipeline> {
    error_scope::push(device);
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(kernel.entry_point()),
        layout: Some(layout),
        module,
        entry_point: kernel.entry_point(),
    });
    match error_scope::pop(device) {
        None => Ok(pipeline),
        Some(err) => {
            let kind = match error_scope::classify(&err) {
                DeviceErrorKind::OutOfMemory => DeviceErrorKind::OutOfMemory,
                _ => DeviceErrorKind::InvalidKernelName,
            };
            Err(DeviceError::new(
                format!("create_compute_pipeline({})", kernel.entry_point()),
                kind,
                err.to_string(),
            )
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A device on any adapter, or `None` on machines without one.
    fn headless_device() -> Option<wgpu::Device> {
        let instance = crate::create_instance();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        let (device, _queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
                .ok()?;
        Some(device)
    }

    #[test]
    fn test_operation_names_carry_kernels() {
        assert_eq!(dispatch_operation(Kernel::Spawn), "dispatch(spawnParticle)");
        assert_eq!(
            submit_operation(&[Kernel::Spawn, Kernel::Update, Kernel::DeathCheck]),
            "queue_submit(spawnParticle, updateParticleState, checkParticleDeath)"
        );
        assert_eq!(
            submit_operation(&[Kernel::Update, Kernel::DeathCheck]),
            "queue_submit(updateParticleState, checkParticleDeath)"
        );
    }

    #[test]
    fn test_buffer_over_limit_is_reported() {
        let Some(device) = headless_device() else {
            return;
        };
        let descriptor = wgpu::BufferDescriptor {
            label: Some("ember.spawn_counter"),
            size: device.limits().max_buffer_size.saturating_add(SPAWN_COUNTER_SIZE),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        };
        match create_buffer(&device, &descriptor) {
            Ok(_) => panic!("buffer above max_buffer_size was accepted"),
            Err(err) => {
                assert_eq!(err.operation(), "create_buffer(ember.spawn_counter)");
                assert!(matches!(
                    err.kind(),
                    DeviceErrorKind::Validation | DeviceErrorKind::OutOfMemory
                ));
            }
        }
    }

    #[test]
    fn test_buffer_within_limit_is_created() {
        let Some(device) = headless_device() else {
            return;
        };
        let descriptor = wgpu::BufferDescriptor {
            label: Some("ember.spawn_counter"),
            size: SPAWN_COUNTER_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        };
        assert!(create_buffer(&device, &descriptor).is_ok());
    }
}
