//! # Particle State
//!
//! The fixed-stride record shared by compute and graphics, and the
//! stateless hashing the kernels draw randomness from.

pub mod random;
mod record;

pub use random::{pcg_hash, slot_hash, unit_float, HashStream};
pub use record::{ParticleRecord, RecordLayout};
