//! Explicit RNG handles.
//!
//! Keys are `u64` seeds split deterministically with ChaCha8, so every random
//! draw (parameter init, synthetic data, shuffling) is threaded through a
//! value the caller owns instead of process-wide state.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// An RNG key for deterministic random number generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RngKey(pub u64);

impl RngKey {
    /// Create a new RNG key from a seed.
    pub fn new(seed: u64) -> Self {
        RngKey(seed)
    }

    /// Split this key into `n` independent keys.
    pub fn split(self, n: usize) -> Vec<RngKey> {
        if n == 0 {
            return Vec::new();
        }
        if n == 1 {
            return vec![self];
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.0);
        (0..n).map(|_| RngKey(rng.next_u64())).collect()
    }

    /// Split into exactly two keys.
    pub fn split_two(self) -> (RngKey, RngKey) {
        let keys = self.split(2);
        (keys[0], keys[1])
    }

    /// Derive a child key for a named sub-component.
    ///
    /// Same key and same tag always give the same child.
    pub fn fold_in(self, tag: u64) -> RngKey {
        let mut rng = ChaCha8Rng::seed_from_u64(self.0 ^ tag.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        RngKey(rng.next_u64())
    }

    /// Seeded generator for host-side sampling.
    pub fn rng(self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0)
    }

    /// `n` samples from `U[-bound, bound)`.
    pub fn uniform(self, n: usize, bound: f32) -> Vec<f32> {
        let mut rng = self.rng();
        if bound <= 0.0 {
            return vec![0.0; n];
        }
        (0..n).map(|_| rng.gen_range(-bound..bound)).collect()
    }

    /// Get the seed value.
    pub fn seed(&self) -> u64 {
        self.0
    }
}
