//! Seeded random source for surrogate construction.

use rand::seq::IndexedRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

/// Deterministic source of pseudo-random values.
///
/// The SHA-256 digest of the seed parts keys a ChaCha8 stream, which gives
/// the same values on every platform and release.
#[derive(Debug, Clone)]
pub struct SeedStream {
    rng: ChaCha8Rng,
}

impl SeedStream {
    /// Seed from a sequence of parts. Parts are length-prefixed so that
    /// `["ab", "c"]` and `["a", "bc"]` give different streams.
    pub fn new(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&hasher.finalize());
        Self {
            rng: ChaCha8Rng::from_seed(seed),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Value in `0..n`, or 0 when `n` is 0.
    pub fn below(&mut self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        self.rng.random_range(0..n)
    }

    /// Value in `lo..=hi`. `lo` must not exceed `hi`.
    pub fn range(&mut self, lo: u64, hi: u64) -> u64 {
        self.rng.random_range(lo..=hi)
    }

    /// Uniform choice from `items`; the default value for an empty slice.
    pub fn pick<T: Copy + Default>(&mut self, items: &[T]) -> T {
        items.choose(&mut self.rng).copied().unwrap_or_default()
    }

    /// Lowercase hex string of `n_bytes` random bytes.
    pub fn hex(&mut self, n_bytes: usize) -> String {
        let mut bytes = vec![0u8; n_bytes];
        self.rng.fill(&mut bytes[..]);
        hex::encode(bytes)
    }
}
