//! Per-frame kernel seeds.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::SimulationConfig;

/// Largest increment between consecutive seeds.
pub const MAX_SEED_STEP: u64 = 1024;

/// Frames guaranteed before the sequence can wrap: two seeds per frame, each
/// at most [`MAX_SEED_STEP`] above the last.
pub const SEED_HORIZON_FRAMES: u64 = u64::MAX / (2 * MAX_SEED_STEP);

/// Seeds handed to the kernels of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSeeds {
    /// Spawn kernel seed.
    pub spawn: u64,
    /// Update kernel seed.
    pub update: u64,
}

/// Strictly increasing 64-bit seeds with random increments.
///
/// Wrapping needs at least [`SEED_HORIZON_FRAMES`] frames, about 9e15.
#[derive(Debug, Clone)]
pub struct SeedSequence {
    rng: ChaCha8Rng,
    last: u64,
}

impl SeedSequence {
    /// A reproducible sequence.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            last: 0,
        }
    }

    /// The configured sequence, or one seeded from the clock.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        let seed = config.seed.unwrap_or_else(clock_seed);
        tracing::debug!(seed, "seed sequence initialised");
        Self::new(seed)
    }

    /// Next seed.
    pub fn next_seed(&mut self) -> u64 {
        self.last = self.last.wrapping_add(self.rng.gen_range(1..=MAX_SEED_STEP));
        self.last
    }

    /// Seeds for the next frame.
    pub fn next_frame(&mut self) -> FrameSeeds {
        FrameSeeds {
            spawn: self.next_seed(),
            update: self.next_seed(),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0x5EED, |elapsed| elapsed.as_nanos() as u64)
}
