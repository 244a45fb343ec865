use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;

use super::Sampler;

/// Sampler that can return to the state it had after any number of draws.
///
/// The index counts values produced since the last seed. Every value
/// consumes one 32-bit word of the ChaCha stream, so `rewind(i)` seeks
/// straight to word `i`.
#[derive(Debug, Clone)]
pub struct RewindableSampler {
    rng: ChaCha12Rng,
    index: u64,
}

impl RewindableSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha12Rng::seed_from_u64(seed),
            index: 0,
        }
    }

    /// Number of values drawn since seeding.
    pub fn sample_index(&self) -> u64 {
        self.index
    }

    pub fn rewind(&mut self, index: u64) {
        self.rng.set_word_pos(index as u128);
        self.index = index;
    }
}

impl Sampler for RewindableSampler {
    #[inline]
    fn next(&mut self) -> f32 {
        self.index += 1;
        self.rng.gen()
    }

    fn set_seed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }
}
