// crates/lot_core/src/rng.rs
//
// Deterministic, integer-only RNG for lottery draws.
// Focus: unbiased range generation, stable seeding, word accounting, split streams.
//
// • The seed is the only source of randomness; it is persisted with every result
//   so a run can be replayed for audits without re-randomizing.
// • Integer-only: unbiased ranges via rejection sampling, no floating point.
// • Cross-platform determinism: explicit seed mapping and word-index accounting.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};

/// Injectable source of uniform integers for samplers.
///
/// Implemented by [`LotteryRng`]; tests may provide scripted sources.
pub trait DrawSource {
    /// Uniform integer in `[0, n)`; `None` (and no consumption) when `n == 0`.
    fn gen_range(&mut self, n: u64) -> Option<u64>;

    /// Number of 64-bit words consumed so far.
    fn words_consumed(&self) -> u128;

    /// Independent sub-stream keyed by `id`, derived from the same seed.
    fn stream(&self, id: u64) -> Self
    where
        Self: Sized;
}

/// Seeded ChaCha20 generator for lottery draws.
///
/// The mapping from `u64` to the 32-byte ChaCha seed is explicit:
/// `seed.to_le_bytes()` in the first 8 bytes, the remaining 24 bytes zero.
#[derive(Debug, Clone)]
pub struct LotteryRng {
    seed: u64,
    rng: ChaCha20Rng,
    words_consumed: u128,
}

impl LotteryRng {
    #[inline]
    pub fn from_seed_u64(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha20Rng::from_seed(seed_bytes(seed)),
            words_consumed: 0,
        }
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draw the next u64 and advance the word counter.
    /// This is the only place where the counter is advanced.
    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.words_consumed = self.words_consumed.saturating_add(1);
        self.rng.next_u64()
    }
}

impl DrawSource for LotteryRng {
    /// Let `threshold = 2^64 mod n` (computed via `wrapping_neg() % n`).
    /// Accept `x` if `x >= threshold`; then `x % n` is uniformly distributed.
    #[inline]
    fn gen_range(&mut self, n: u64) -> Option<u64> {
        if n == 0 {
            return None;
        }
        let threshold = n.wrapping_neg() % n;
        loop {
            let x = self.next_u64();
            if x >= threshold {
                return Some(x % n);
            }
        }
    }

    #[inline]
    fn words_consumed(&self) -> u128 {
        self.words_consumed
    }

    fn stream(&self, id: u64) -> Self {
        let mut rng = ChaCha20Rng::from_seed(seed_bytes(self.seed));
        rng.set_stream(id);
        Self {
            seed: self.seed,
            rng,
            words_consumed: 0,
        }
    }
}

#[inline]
fn seed_bytes(seed: u64) -> [u8; 32] {
    let mut seed32 = [0u8; 32];
    seed32[..8].copy_from_slice(&seed.to_le_bytes());
    seed32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_range_zero_none() {
        let mut rng = LotteryRng::from_seed_u64(0xDEADBEEFCAFEBABE);
        assert_eq!(rng.gen_range(0), None);
        assert_eq!(rng.words_consumed(), 0);
    }

    #[test]
    fn gen_range_is_deterministic_per_seed() {
        let mut a = LotteryRng::from_seed_u64(123456789);
        let mut b = LotteryRng::from_seed_u64(123456789);
        let seq_a: Vec<u64> = (0..16).map(|_| a.gen_range(10).unwrap()).collect();
        let seq_b: Vec<u64> = (0..16).map(|_| b.gen_range(10).unwrap()).collect();
        assert_eq!(seq_a, seq_b);
        assert!(seq_a.iter().all(|&v| v < 10));
        assert_eq!(a.words_consumed(), b.words_consumed());
    }

    #[test]
    fn streams_are_independent_and_reproducible() {
        let base = LotteryRng::from_seed_u64(42);
        let mut s1 = base.stream(1);
        let mut s1_again = base.stream(1);
        let mut s2 = base.stream(2);
        let a: Vec<u64> = (0..8).map(|_| s1.gen_range(u64::MAX).unwrap()).collect();
        let b: Vec<u64> = (0..8).map(|_| s1_again.gen_range(u64::MAX).unwrap()).collect();
        let c: Vec<u64> = (0..8).map(|_| s2.gen_range(u64::MAX).unwrap()).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(s2.seed(), 42);
    }
}
