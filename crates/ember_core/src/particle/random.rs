//! Stateless hashing used by the kernels.
//!
//! Kernels have no per-invocation RNG state; randomness comes from hashing
//! the frame seed with the slot index. The WGSL programs carry the same
//! functions, so the host device and the GPU draw the same streams.

/// PCG-RXS-M-XS 32-bit hash.
#[inline]
#[must_use]
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Mixes a frame seed with a slot index.
#[inline]
#[must_use]
pub fn slot_hash(seed: u32, index: u32) -> u32 {
    pcg_hash(seed ^ pcg_hash(index))
}

/// Maps a hash to `[0, 1)` using its top 24 bits.
#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn unit_float(hash: u32) -> f32 {
    (hash >> 8) as f32 * (1.0 / 16_777_216.0)
}

/// Successive uniform samples derived from one starting hash.
#[derive(Debug, Clone, Copy)]
pub struct HashStream {
    state: u32,
}

impl HashStream {
    /// Starts a stream at `hash`.
    #[must_use]
    pub fn new(hash: u32) -> Self {
        Self { state: hash }
    }

    /// Next sample in `[0, 1)`.
    pub fn next_unit(&mut self) -> f32 {
        self.state = pcg_hash(self.state);
        unit_float(self.state)
    }

    /// Next sample in `[-1, 1)`.
    pub fn next_signed(&mut self) -> f32 {
        self.next_unit() * 2.0 - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcg_hash_known_values() {
        // Reference values of the published PCG hash.
        assert_eq!(pcg_hash(0), 129_708_002);
        assert_ne!(pcg_hash(1), pcg_hash(2));
    }

    #[test]
    fn test_unit_float_range() {
        assert_eq!(unit_float(0), 0.0);
        assert!(unit_float(u32::MAX) < 1.0);
        let mut stream = HashStream::new(42);
        for _ in 0..10_000 {
            let s = stream.next_signed();
            assert!((-1.0..1.0).contains(&s));
        }
    }

    #[test]
    fn test_slot_hash_varies_with_seed_and_index() {
        assert_ne!(slot_hash(1, 0), slot_hash(2, 0));
        assert_ne!(slot_hash(1, 0), slot_hash(1, 1));
    }
}
