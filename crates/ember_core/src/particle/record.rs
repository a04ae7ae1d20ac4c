//! # Particle Record
//!
//! One 64-byte slot of the shared buffer. The same bytes are read by the
//! compute kernels (as a storage array of structs) and by the vertex fetch
//! (position and alive flag at fixed offsets), so the layout here is a
//! contract with both programs.
//!
//! ```text
//! offset  0            12     16  17    20       24      32           44    48            64
//!         | position   |spawn |al|pad  |lifetime|  pad  | velocity   |seed | reserved    |
//!         | 3 x f32    | f32  |u8|3xu8 |  f32   | 2xf32 | 3 x f32    | u32 | 4 x f32     |
//! ```

use bytemuck::{Pod, Zeroable};

/// Byte offsets and stride of [`ParticleRecord`].
///
/// These are the values the vertex layout and the kernel struct are built
/// against. Tests compare them with the compiler's layout.
pub struct RecordLayout;

impl RecordLayout {
    /// Bytes per particle.
    pub const STRIDE: u64 = 64;
    /// Offset of `position` (vertex attribute 0).
    pub const POSITION_OFFSET: u64 = 0;
    /// Offset of the alive flag (vertex attribute 1).
    pub const ALIVE_OFFSET: u64 = 16;

    /// Every named field as `(name, offset, size)`, in memory order.
    ///
    /// Field names match the kernel-side struct declaration.
    pub const FIELDS: [(&'static str, u64, u64); 8] = [
        ("position", 0, 12),
        ("spawn_time", 12, 4),
        ("alive", 16, 4),
        ("lifetime", 20, 4),
        ("_pad0", 24, 8),
        ("velocity", 32, 12),
        ("seed", 44, 4),
        ("scratch", 48, 16),
    ];

    /// Bytes needed for `capacity` particles.
    #[must_use]
    pub const fn buffer_size(capacity: u32) -> u64 {
        capacity as u64 * Self::STRIDE
    }
}

/// Per-particle state.
///
/// The alive flag is the single byte at offset 16; `alive_pad` stays zero so
/// the kernels can treat bytes 16..20 as one little-endian `u32`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleRecord {
    /// World-space position.
    pub position: [f32; 3],
    /// Simulation time at spawn.
    pub spawn_time: f32,
    /// Nonzero while alive.
    pub alive: u8,
    /// Always zero.
    pub alive_pad: [u8; 3],
    /// Seconds the particle may live.
    pub lifetime: f32,
    /// Unused.
    pub _pad0: [f32; 2],
    /// Velocity in units per second.
    pub velocity: [f32; 3],
    /// Random seed chosen at spawn.
    pub seed: u32,
    /// Kernel scratch.
    pub scratch: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<ParticleRecord>() as u64 == RecordLayout::STRIDE);

impl ParticleRecord {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// A zeroed, dead slot.
    #[must_use]
    pub fn dead() -> Self {
        Self::zeroed()
    }

    /// Whether the slot holds a live particle.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive != 0
    }

    /// Seconds since spawn at `current_time`.
    #[inline]
    #[must_use]
    pub fn age(&self, current_time: f32) -> f32 {
        current_time - self.spawn_time
    }
}
