use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tessera_math::Vec2;

use super::Sampler;

/// Number of dimensions that are stratified; later ones are uniform.
pub const MAX_STRATIFIED_DIMENSIONS: usize = 32;

/// Jittered stratified sampler over sets of `strata * strata` samples.
///
/// Within a set, every dimension visits each of its strata exactly once:
/// [`next_vec2`](Sampler::next_vec2) uses a `strata x strata` grid and
/// [`next`](Sampler::next) `strata * strata` intervals. Each dimension
/// walks its strata in an independently shuffled order, so dimensions of
/// the same sample stay uncorrelated. Samples are delimited by
/// [`begin_sample`](Sampler::begin_sample).
#[derive(Debug, Clone)]
pub struct StratifiedSampler {
    rng: StdRng,
    strata: usize,
    /// Index of the current sample within its set.
    sample: usize,
    dimension: usize,
    /// Per-dimension order of the strata for the current set.
    permutations: Vec<Vec<usize>>,
}

impl StratifiedSampler {
    pub fn new(seed: u64, strata: usize) -> Self {
        let strata = strata.max(1);
        Self {
            rng: StdRng::seed_from_u64(seed),
            strata,
            sample: strata * strata - 1,
            dimension: 0,
            permutations: Vec::new(),
        }
    }

    /// Samples per set.
    pub fn set_size(&self) -> usize {
        self.strata * self.strata
    }

    /// Stratum of the current sample in `dimension`, or `None` past the
    /// stratified dimensions.
    fn next_stratum(&mut self) -> Option<usize> {
        let d = self.dimension;
        self.dimension += 1;
        if d >= MAX_STRATIFIED_DIMENSIONS {
            return None;
        }
        let n = self.set_size();
        while self.permutations.len() <= d {
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(&mut self.rng);
            self.permutations.push(order);
        }
        Some(self.permutations[d][self.sample])
    }
}

impl Sampler for StratifiedSampler {
    fn next(&mut self) -> f32 {
        let jitter: f32 = self.rng.gen();
        match self.next_stratum() {
            Some(stratum) => {
                let n = self.set_size() as f32;
                ((stratum as f32 + jitter) / n).min(1.0 - f32::EPSILON)
            }
            None => jitter,
        }
    }

    fn next_vec2(&mut self) -> Vec2 {
        let jitter = Vec2::new(self.rng.gen(), self.rng.gen());
        match self.next_stratum() {
            Some(stratum) => {
                let cell = Vec2::new((stratum % self.strata) as f32, (stratum / self.strata) as f32);
                ((cell + jitter) / self.strata as f32).min(Vec2::splat(1.0 - f32::EPSILON))
            }
            None => jitter,
        }
    }

    fn begin_sample(&mut self) {
        self.sample += 1;
        if self.sample >= self.set_size() {
            self.sample = 0;
            self.permutations.clear();
        }
        self.dimension = 0;
    }

    fn set_seed(&mut self, seed: u64) {
        *self = Self::new(seed, self.strata);
    }
}
