//! # Simulation Configuration
//!
//! Compiled-in defaults, optionally overridden by `ember.toml` in the working
//! directory and then by a few `EMBER_*` environment variables. Every table
//! is `#[serde(default)]`, so a file only needs the keys it changes.
//!
//! ```toml
//! capacity = 250000
//! spawn_rate = 50000.0
//!
//! [render]
//! sprite_mode = "points"
//! ```

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default configuration file, resolved against the working directory.
pub const CONFIG_FILE: &str = "ember.toml";

/// Largest work-group size any backend is required to accept.
pub const MAX_GROUP_SIZE: u32 = 1024;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of particle slots `N`. Fixed for the lifetime of the process.
    pub capacity: u32,
    /// Particles spawned per second of simulation time.
    pub spawn_rate: f32,
    /// Kernel work-group size `G`.
    pub group_size: u32,
    /// Upper bound on a single frame's timestep, in seconds.
    pub max_frame_dt: f32,
    /// Seed for the per-frame seed sequence. `None` derives one from the clock.
    pub seed: Option<u64>,
    /// Where and how particles are born.
    pub emitter: EmitterConfig,
    /// Forces applied by the update kernel.
    pub forces: ForceConfig,
    /// Kill volume used by the death check.
    pub bounds: BoundsConfig,
    /// Initial camera and projection.
    pub camera: CameraConfig,
    /// Window and sprite rendering.
    pub render: RenderConfig,
    /// Program and texture source paths.
    pub sources: SourceConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            spawn_rate: 200_000.0,
            group_size: 256,
            max_frame_dt: 0.1,
            seed: None,
            emitter: EmitterConfig::default(),
            forces: ForceConfig::default(),
            bounds: BoundsConfig::default(),
            camera: CameraConfig::default(),
            render: RenderConfig::default(),
            sources: SourceConfig::default(),
        }
    }
}

/// Particle emitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Disc center in world space.
    pub position: [f32; 3],
    /// Disc radius (horizontal plane).
    pub radius: f32,
    /// Mean launch velocity.
    pub launch_velocity: [f32; 3],
    /// Per-axis random spread added to the launch velocity.
    pub launch_spread: f32,
    /// Shortest lifetime in seconds.
    pub lifetime_min: f32,
    /// Longest lifetime in seconds.
    pub lifetime_max: f32,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            radius: 1.0,
            launch_velocity: [0.0, 18.0, 0.0],
            launch_spread: 6.0,
            lifetime_min: 2.0,
            lifetime_max: 6.0,
        }
    }
}

/// Forces integrated by the update kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    /// Constant acceleration.
    pub gravity: [f32; 3],
    /// Amplitude of the per-frame random acceleration.
    pub turbulence: f32,
    /// Linear velocity damping per second.
    pub drag: f32,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81, 0.0],
            turbulence: 4.0,
            drag: 0.1,
        }
    }
}

/// Kill volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsConfig {
    /// Particles farther than this from the emitter die.
    pub radius: f32,
    /// Particles below this height die.
    pub floor: f32,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            radius: 200.0,
            floor: -10.0,
        }
    }
}

/// Camera start state and projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Start position.
    pub position: [f32; 3],
    /// Start elevation in radians (negative looks down).
    pub elevation: f32,
    /// Linear speed in units per second.
    pub speed: f32,
    /// Elevation speed in degrees per second.
    pub rotation_speed_deg: f32,
    /// Vertical field of view in degrees.
    pub fov_y_deg: f32,
    /// Near clip plane.
    pub near: f32,
    /// Far clip plane.
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 20.0, -23.0],
            elevation: -std::f32::consts::FRAC_PI_4,
            speed: 50.0,
            rotation_speed_deg: 45.0,
            fov_y_deg: 75.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// How each particle is rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpriteMode {
    /// One pixel per particle.
    Points,
    /// One camera-facing textured quad per particle.
    Billboards,
}

/// Window and sprite rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Base window title; the FPS counter is appended.
    pub title: String,
    /// Initial window size as a fraction of the primary monitor.
    pub window_fraction: f32,
    /// Sprite rasterization.
    pub sprite_mode: SpriteMode,
    /// Billboard edge length in world units.
    pub sprite_size: f32,
    /// RGB tint multiplied with the sprite texture.
    pub tint: [f32; 3],
    /// Wait for vertical blank when presenting.
    pub vsync: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title: "ember".to_owned(),
            window_fraction: 0.75,
            sprite_mode: SpriteMode::Billboards,
            sprite_size: 0.35,
            tint: [1.0, 0.55, 0.2],
            vsync: false,
        }
    }
}

/// Program and texture sources.
///
/// Unset program paths select the embedded programs. A set path that cannot
/// be read is a fatal setup error; an unreadable texture only warns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Kernel program (WGSL) override.
    pub kernel_path: Option<PathBuf>,
    /// Shading program (WGSL) override.
    pub shader_path: Option<PathBuf>,
    /// Sprite texture.
    pub texture_path: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kernel_path: None,
            shader_path: None,
            texture_path: Some(PathBuf::from("data/particle.png")),
        }
    }
}

impl SimulationConfig {
    /// Parses a configuration from TOML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML and
    /// [`ConfigError::Invalid`] on out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, Path::new("<inline>"))
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Loads `path` if it exists, otherwise the defaults; then applies
    /// environment overrides and validates.
    ///
    /// # Errors
    ///
    /// A file that exists but is unreadable or invalid is an error; a missing
    /// file is not.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match Self::load(path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded configuration");
                config
            }
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no configuration file, using defaults");
                Self::default()
            }
            Err(err) => return Err(err),
        };
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `EMBER_CAPACITY`, `EMBER_SPAWN_RATE`, `EMBER_SEED` and
    /// `EMBER_SPRITE_MODE` through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a set variable does not parse.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{key}={value:?} does not parse")))
        }

        if let Some(value) = lookup("EMBER_CAPACITY") {
            self.capacity = parse_var("EMBER_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("EMBER_SPAWN_RATE") {
            self.spawn_rate = parse_var("EMBER_SPAWN_RATE", &value)?;
        }
        if let Some(value) = lookup("EMBER_SEED") {
            self.seed = Some(parse_var("EMBER_SEED", &value)?);
        }
        if let Some(value) = lookup("EMBER_SPRITE_MODE") {
            self.render.sprite_mode = match value.trim() {
                "points" => SpriteMode::Points,
                "billboards" => SpriteMode::Billboards,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "EMBER_SPRITE_MODE={other:?} is not points or billboards"
                    )))
                }
            };
        }
        Ok(())
    }

    /// Checks every value for range and consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.capacity == 0 {
            return invalid("capacity must be at least 1".into());
        }
        if !self.group_size.is_power_of_two() || self.group_size > MAX_GROUP_SIZE {
            return invalid(format!(
                "group_size {} must be a power of two no larger than {MAX_GROUP_SIZE}",
                self.group_size
            ));
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate < 0.0 {
            return invalid(format!("spawn_rate {} must be finite and >= 0", self.spawn_rate));
        }
        if !(self.max_frame_dt > 0.0 && self.max_frame_dt.is_finite()) {
            return invalid(format!("max_frame_dt {} must be > 0", self.max_frame_dt));
        }
        let emitter = &self.emitter;
        if !(emitter.lifetime_min >= 0.0 && emitter.lifetime_min <= emitter.lifetime_max) {
            return invalid(format!(
                "emitter lifetime range [{}, {}] is empty or negative",
                emitter.lifetime_min, emitter.lifetime_max
            ));
        }
        if emitter.radius < 0.0 || emitter.launch_spread < 0.0 {
            return invalid("emitter radius and launch_spread must be >= 0".into());
        }
        if self.forces.drag < 0.0 || self.forces.turbulence < 0.0 {
            return invalid("forces drag and turbulence must be >= 0".into());
        }
        if self.bounds.radius <= 0.0 {
            return invalid(format!("bounds radius {} must be > 0", self.bounds.radius));
        }
        let camera = &self.camera;
        if !(camera.fov_y_deg > 0.0 && camera.fov_y_deg < 180.0) {
            return invalid(format!("camera fov_y_deg {} must be in (0, 180)", camera.fov_y_deg));
        }
        if !(camera.near > 0.0 && camera.near < camera.far) {
            return invalid(format!(
                "camera clip planes near={} far={} must satisfy 0 < near < far",
                camera.near, camera.far
            ));
        }
        if !(self.render.window_fraction > 0.0 && self.render.window_fraction <= 1.0) {
            return invalid(format!(
                "render window_fraction {} must be in (0, 1]",
                self.render.window_fraction
            ));
        }
        if self.render.sprite_size <= 0.0 {
            return invalid(format!("render sprite_size {} must be > 0", self.render.sprite_size));
        }
        Ok(())
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}
