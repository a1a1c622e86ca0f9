//! Deterministic random number generation.
//!
//! RULE: The sampler never touches an ambient RNG.
//! Every run draws from a SelectionRng built from an explicit seed,
//! and that seed is written to the batch log so any run can be replayed.

use rand::{Error, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A seeded RNG for one batch run.
pub struct SelectionRng {
    seed:  u64,
    inner: Pcg64Mcg,
}

impl SelectionRng {
    /// Create an RNG from an explicit seed. Same seed, same draws.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Draw a fresh seed from OS entropy. Used only when the caller
    /// did not ask for a specific seed.
    pub fn from_entropy() -> Self {
        let mut bootstrap = Pcg64Mcg::from_entropy();
        Self::new(bootstrap.next_u64())
    }

    /// The seed this stream was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        let bits = self.inner.next_u64();
        let roll = (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64);
        roll < p
    }
}

impl RngCore for SelectionRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.inner.try_fill_bytes(dest)
    }
}
