//! # EMBER Core
//!
//! Device-agnostic heart of the particle simulation:
//! - 1,000,000 particles in one fixed-stride buffer
//! - shared by compute kernels and the draw call, never copied to the host
//! - handed between the two under an explicit ownership protocol
//!
//! ## Architecture
//!
//! ```text
//!        ┌───────────────────────── FrameScheduler ─────────────────────────┐
//!        │                                                                  │
//!        │   FrameClock ──dt──▶ ComputeStage ──plan──▶ ComputeScope         │
//!        │   SeedSequence ─────────▲                   (spawn/update/death) │
//!        │                                                  │ release       │
//!        │   CameraController ──view──▶ ParticleRenderer ◀──┘ GraphicsAccess│
//!        └──────────────────────────────────────────────────────────────────┘
//!                                     │
//!                        SharedParticleBuffer<D: ParticleDevice>
//!                          ├── HostDevice (CPU reference, tests)
//!                          └── GPU device (ember_rendering)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember_core::{FrameClock, FrameScheduler, HeadlessRenderer, HostDevice, SimulationConfig};
//!
//! let config = SimulationConfig::default();
//! let device = HostDevice::from_config(&config)?;
//! let mut scheduler = FrameScheduler::new(device, HeadlessRenderer::new(), &config, 1280, 720);
//! let mut clock = FrameClock::from_config(&config);
//! scheduler.run_frame(clock.tick(), Default::default())?;
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod camera;
pub mod compute;
pub mod config;
pub mod error;
pub mod host;
pub mod particle;
pub mod protocol;
pub mod scheduler;

pub use camera::{CameraController, CameraIntent, CameraIntents, CameraState, ViewportState};
pub use compute::{
    spawn_budget, ComputeStage, FramePlan, Kernel, KernelArgs, KernelInvocation, KernelParams,
    ParticleDevice, SimParams,
};
pub use config::{SimulationConfig, SpriteMode, CONFIG_FILE};
pub use error::{
    ConfigError, DeviceError, DeviceErrorKind, DeviceResult, EmberError, EmberResult, FrameError,
    FrameResult, SetupError, SetupResult,
};
pub use host::HostDevice;
pub use particle::{ParticleRecord, RecordLayout};
pub use protocol::{
    BufferOwner, ComputeScope, DeviceCapabilities, GraphicsAccess, InteropRequirements,
    OwnershipEvent, OwnershipJournal, ProtocolViolation, SharedParticleBuffer,
};
pub use scheduler::{
    FrameClock, FramePhase, FrameReport, FrameScheduler, FrameStats, FrameTime, FrameView,
    HeadlessRenderer, ParticleRenderer, SeedSequence,
};
