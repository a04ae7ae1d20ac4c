//! # Camera
//!
//! Keyboard intents accumulate into a position and an elevation angle; the
//! render stage reads the resulting view and projection matrices.
//!
//! The camera never yaws: it always faces +Z and tilts up or down, so the
//! forward vector is `(0, sin e, cos e)`.

use glam::{Mat4, Vec3};

use crate::config::CameraConfig;

/// Largest elevation magnitude; keeps the forward vector off the up axis.
pub const MAX_ELEVATION: f32 = 89.0 * std::f32::consts::PI / 180.0;

/// One held-key intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraIntent {
    /// +Z.
    MoveForward,
    /// −Z.
    MoveBackward,
    /// +Y.
    MoveUp,
    /// −Y.
    MoveDown,
    /// +X.
    MoveLeft,
    /// −X.
    MoveRight,
    /// Raise elevation.
    TiltUp,
    /// Lower elevation.
    TiltDown,
}

impl CameraIntent {
    /// Every intent.
    pub const ALL: [CameraIntent; 8] = [
        CameraIntent::MoveForward,
        CameraIntent::MoveBackward,
        CameraIntent::MoveUp,
        CameraIntent::MoveDown,
        CameraIntent::MoveLeft,
        CameraIntent::MoveRight,
        CameraIntent::TiltUp,
        CameraIntent::TiltDown,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of intents held this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraIntents(u8);

impl CameraIntents {
    /// No intents.
    pub const NONE: CameraIntents = CameraIntents(0);

    /// Adds `intent`.
    pub fn insert(&mut self, intent: CameraIntent) {
        self.0 |= intent.bit();
    }

    /// Removes `intent`.
    pub fn remove(&mut self, intent: CameraIntent) {
        self.0 &= !intent.bit();
    }

    /// Whether `intent` is held.
    #[must_use]
    pub fn contains(self, intent: CameraIntent) -> bool {
        self.0 & intent.bit() != 0
    }

    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<CameraIntent> for CameraIntents {
    fn from_iter<I: IntoIterator<Item = CameraIntent>>(iter: I) -> Self {
        let mut intents = Self::NONE;
        for intent in iter {
            intents.insert(intent);
        }
        intents
    }
}

/// Camera position and elevation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// Eye position.
    pub position: Vec3,
    /// Elevation in radians; negative looks down.
    pub elevation: f32,
}

impl CameraState {
    /// Unit view direction.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        let (sin, cos) = self.elevation.sin_cos();
        Vec3::new(0.0, sin, cos)
    }

    /// Right-handed world-to-view matrix.
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }
}

/// Applies intents to a [`CameraState`] at fixed linear and angular speeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraController {
    state: CameraState,
    speed: f32,
    rotation_speed: f32,
}

impl CameraController {
    /// A controller moving at `speed` units/s and tilting at
    /// `rotation_speed` radians/s.
    #[must_use]
    pub fn new(state: CameraState, speed: f32, rotation_speed: f32) -> Self {
        Self {
            state,
            speed,
            rotation_speed,
        }
    }

    /// Start state and speeds from configuration.
    #[must_use]
    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(
            CameraState {
                position: Vec3::from(config.position),
                elevation: config.elevation.clamp(-MAX_ELEVATION, MAX_ELEVATION),
            },
            config.speed,
            config.rotation_speed_deg.to_radians(),
        )
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &CameraState {
        &self.state
    }

    /// Moves and tilts for the held `intents` over `dt` seconds.
    pub fn apply(&mut self, intents: CameraIntents, dt: f32) {
        if intents.is_empty() || dt <= 0.0 {
            return;
        }
        let step = self.speed * dt;
        let turn = self.rotation_speed * dt;

        for intent in CameraIntent::ALL {
            if !intents.contains(intent) {
                continue;
            }
            match intent {
                CameraIntent::MoveForward => self.state.position.z += step,
                CameraIntent::MoveBackward => self.state.position.z -= step,
                CameraIntent::MoveUp => self.state.position.y += step,
                CameraIntent::MoveDown => self.state.position.y -= step,
                CameraIntent::MoveLeft => self.state.position.x += step,
                CameraIntent::MoveRight => self.state.position.x -= step,
                CameraIntent::TiltUp => self.state.elevation += turn,
                CameraIntent::TiltDown => self.state.elevation -= turn,
            }
        }
        self.state.elevation = self.state.elevation.clamp(-MAX_ELEVATION, MAX_ELEVATION);
    }
}

/// Window size and perspective parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Near clip plane.
    pub near: f32,
    /// Far clip plane.
    pub far: f32,
}

impl ViewportState {
    /// A viewport of `width` x `height` with the configured projection.
    #[must_use]
    pub fn new(width: u32, height: u32, config: &CameraConfig) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            fov_y: config.fov_y_deg.to_radians(),
            near: config.near,
            far: config.far,
        }
    }

    /// Width over height.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Right-handed perspective projection with `[0, 1]` depth.
    #[must_use]
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect(), self.near, self.far)
    }

    /// Adopts a new window size. Zero-sized (minimised) windows are ignored.
    ///
    /// Returns whether the size changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return false;
        }
        self.width = width;
        self.height = height;
        true
    }
}
