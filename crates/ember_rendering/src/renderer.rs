//! # GPU Renderer
//!
//! Graphics side of the shared buffer. Binds the particle storage as vertex
//! buffer 0 and draws every slot each frame; dead slots are hidden by the
//! shading program, never by the draw count.
//!
//! Surface hiccups are soft: a lost or outdated surface is reconfigured and
//! the frame is skipped, a timeout skips the frame. Running out of memory is
//! fatal.

use std::borrow::Cow;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use ember_core::config::RenderConfig;
use ember_core::error::{DeviceError, DeviceErrorKind, DeviceResult, SetupError, SetupResult};
use ember_core::protocol::GraphicsAccess;
use ember_core::scheduler::{FrameView, ParticleRenderer};
use ember_core::ParticleDevice;

use crate::context::GpuContext;
use crate::device::GpuParticleDevice;
use crate::error_scope;
use crate::shaders::{ShaderSources, FS_MAIN};
use crate::texture::{SpriteImage, SpriteTexture};
use crate::vertex;

/// Uniform block of the shading program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RenderUniforms {
    /// Projection matrix, column-major.
    pub projection: [[f32; 4]; 4],
    /// View matrix, column-major.
    pub view: [[f32; 4]; 4],
    /// `x`: billboard edge length.
    pub sprite: [f32; 4],
    /// RGB tint and alpha scale.
    pub tint: [f32; 4],
}

impl RenderUniforms {
    /// Uniforms for one frame.
    #[must_use]
    pub fn new(view: &FrameView, render: &RenderConfig) -> Self {
        let [r, g, b] = render.tint;
        Self {
            projection: view.projection.to_cols_array_2d(),
            view: view.view.to_cols_array_2d(),
            sprite: [render.sprite_size, 0.0, 0.0, 0.0],
            tint: [r, g, b, 1.0],
        }
    }
}

/// Clear color behind the particles.
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color::BLACK;

/// Draws the shared particle buffer to a window surface.
pub struct GpuRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    render: RenderConfig,
    _sprite: SpriteTexture,
}

impl GpuRenderer {
    /// Configures `surface` at `width` x `height` and builds the draw
    /// pipeline for the configured sprite mode.
    ///
    /// # Errors
    ///
    /// - [`SetupError::Window`] if the surface is incompatible with the adapter
    /// - [`SetupError::ProgramBuild`] if the shading program does not compile
    /// - [`SetupError::Device`] if pipeline creation fails
    pub fn new(
        context: &GpuContext,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        render: &RenderConfig,
        sources: &ShaderSources,
        sprite: &SpriteImage,
    ) -> SetupResult<Self> {
        let device = Arc::clone(context.device());
        let queue = Arc::clone(context.queue());

        let caps = surface.get_capabilities(context.adapter());
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| SetupError::Window("surface reports no texture formats".to_owned()))?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: if render.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        tracing::info!(?format, width, height, vsync = render.vsync, "surface configured");

        let sprite = SpriteTexture::upload(&device, &queue, sprite);
        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ember.render.uniforms"),
            size: std::mem::size_of::<RenderUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ember.render.bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ember.render.bg"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&sprite.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sprite.sampler),
                },
            ],
        });

        error_scope::push(&device);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ember.render"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(sources.render.as_str())),
        });
        if let Some(err) = error_scope::pop(&device) {
            return Err(SetupError::ProgramBuild {
                program: "particle shading".to_owned(),
                log: err.to_string(),
            });
        }

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ember.render.pl"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let mode = render.sprite_mode;
        error_scope::push(&device);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("ember.render.pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: vertex::vertex_entry(mode),
                buffers: &[vertex::particle_vertex_layout(mode)],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: FS_MAIN,
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: vertex::topology(mode),
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });
        error_scope::check(&device, "create_render_pipeline")?;
        tracing::info!(?mode, "render pipeline built");

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            pipeline,
            uniforms,
            bind_group,
            render: render.clone(),
            _sprite: sprite,
        })
    }

    /// Current surface size.
    #[must_use]
    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn acquire_frame(&mut self) -> DeviceResult<Option<wgpu::SurfaceTexture>> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                tracing::warn!(%err, "surface needs reconfiguring, skipping frame");
                self.surface.configure(&self.device, &self.surface_config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("timed out acquiring surface image, skipping frame");
                Ok(None)
            }
            Err(err @ wgpu::SurfaceError::OutOfMemory) => Err(DeviceError::new(
                "get_current_texture",
                DeviceErrorKind::OutOfMemory,
                err.to_string(),
            )),
        }
    }
}

impl ParticleRenderer<GpuParticleDevice> for GpuRenderer {
    type Frame = wgpu::SurfaceTexture;

    fn draw(
        &mut self,
        particles: &GraphicsAccess<'_, GpuParticleDevice>,
        view: &FrameView,
    ) -> DeviceResult<Option<wgpu::SurfaceTexture>> {
        let Some(frame) = self.acquire_frame()? else {
            return Ok(None);
        };
        self.queue.write_buffer(
            &self.uniforms,
            0,
            bytemuck::bytes_of(&RenderUniforms::new(view, &self.render)),
        );

        let target = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ember.render"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ember.particles.draw"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });

            let (vertices, instances) =
                vertex::draw_ranges(self.render.sprite_mode, particles.draw_count());
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.set_vertex_buffer(0, particles.device().particle_buffer().slice(..));
            pass.draw(vertices, instances);
        }

        error_scope::push(&self.device);
        self.queue.submit(Some(encoder.finish()));
        error_scope::check(&self.device, "queue_submit(render)")?;
        tracing::trace!(count = particles.device().capacity(), "particles drawn");
        Ok(Some(frame))
    }

    fn present(&mut self, frame: wgpu::SurfaceTexture) {
        frame.present();
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::camera::{CameraController, ViewportState};
    use ember_core::config::CameraConfig;

    #[test]
    fn test_uniforms_from_view() {
        let camera = CameraController::from_config(&CameraConfig::default());
        let viewport = ViewportState::new(1280, 720, &CameraConfig::default());
        let view = FrameView {
            projection: viewport.projection(),
            view: camera.state().view_matrix(),
            particle_count: 10,
        };
        let render = RenderConfig::default();
        let uniforms = RenderUniforms::new(&view, &render);

        assert_eq!(std::mem::size_of::<RenderUniforms>(), 160);
        assert_eq!(uniforms.projection, view.projection.to_cols_array_2d());
        assert_eq!(uniforms.sprite[0], render.sprite_size);
        assert_eq!(uniforms.tint, [1.0, 0.55, 0.2, 1.0]);
    }
}
