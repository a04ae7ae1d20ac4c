//! # EMBER Rendering
//!
//! `wgpu` backend for the particle simulation:
//! - one storage buffer of particle records, also bound as vertex input
//! - four WGSL kernels recorded and submitted per frame
//! - a draw of every slot as points or camera-facing billboards
//!
//! ## Setup
//!
//! ```text
//! Instance ─▶ Surface ─▶ GpuContext (adapter, capability check, device)
//!                              │
//!                 ┌────────────┴────────────┐
//!        GpuParticleDevice            GpuRenderer
//!        (ParticleDevice)             (ParticleRenderer)
//!                 └──── FrameScheduler ─────┘
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod context;
pub mod device;
pub mod error_scope;
pub mod renderer;
pub mod shaders;
pub mod texture;
pub mod vertex;

pub use context::{create_instance, GpuContext};
pub use device::GpuParticleDevice;
pub use renderer::{GpuRenderer, RenderUniforms};
pub use shaders::ShaderSources;
pub use texture::{SpriteImage, SpriteTexture};
