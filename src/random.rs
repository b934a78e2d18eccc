//! Sources of randomness for sharing and triple generation.

use rand::{CryptoRng, Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// A cryptographically secure source of uniformly random integers.
///
/// Every [`CryptoRng`] is a `RandomSource`. Implement it directly to plug in other sources, e.g.
/// a hardware generator or a deterministic source for replaying a recorded run.
pub trait RandomSource {
    /// Samples uniformly from the inclusive range `low..=high`.
    fn uniform(&mut self, low: u64, high: u64) -> u64;

    /// Samples a uniformly random bit.
    fn bit(&mut self) -> bool {
        self.uniform(0, 1) == 1
    }
}

impl<R: CryptoRng> RandomSource for R {
    fn uniform(&mut self, low: u64, high: u64) -> u64 {
        debug_assert!(low <= high, "empty range {low}..={high}");
        self.random_range(low..=high)
    }
}

/// Returns a ChaCha20 generator seeded from the operating system.
pub fn os_rng() -> ChaCha20Rng {
    ChaCha20Rng::from_os_rng()
}
