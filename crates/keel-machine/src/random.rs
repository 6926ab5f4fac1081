use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform random integer source consumed by the lottery scheduler.
///
/// Wraps a [`StdRng`] so tests can pin a seed and replay a draw sequence.
pub struct Random {
    rng: StdRng,
}

impl Random {
    /// Entropy-seeded source, for normal kernel operation.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic source with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform integer in `[0, bound)`. `bound` must be nonzero.
    pub fn below(&mut self, bound: u32) -> u32 {
        self.rng.gen_range(0..bound)
    }
}
