//! Primary sample space state for Metropolis sampling.
//!
//! Each coordinate remembers the time it was last brought up to date.
//! Mutations are applied lazily when a coordinate is read, so a proposal
//! only touches the coordinates the path sampler actually consumes.

use super::Sampler;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PrimarySample {
    value: f32,
    modified: u64,
}

/// Sampler whose values are mutated by Kelemen-style small steps or
/// replaced by large steps, with accept/reject of whole proposals.
pub struct PrimarySampler {
    rng: Box<dyn Sampler>,
    stashed_rng: Option<Box<dyn Sampler>>,
    s1: f32,
    s2: f32,
    log_ratio: f32,
    /// Number of accepted mutations.
    time: u64,
    /// Time of the last accepted large step.
    large_step_time: u64,
    large_step: bool,
    index: usize,
    samples: Vec<PrimarySample>,
    /// Coordinates overwritten by the current proposal.
    backup: Vec<(usize, PrimarySample)>,
}

impl PrimarySampler {
    /// `s1` and `s2` are the smallest and largest small-step sizes.
    pub fn new(rng: Box<dyn Sampler>, s1: f32, s2: f32) -> Self {
        Self {
            rng,
            stashed_rng: None,
            s1,
            s2,
            log_ratio: -(s2 / s1).ln(),
            time: 0,
            large_step_time: 0,
            large_step: false,
            index: 0,
            samples: Vec::new(),
            backup: Vec::new(),
        }
    }

    pub fn kernel_sizes(&self) -> (f32, f32) {
        (self.s1, self.s2)
    }

    pub fn enable_large_step(&mut self, enable: bool) {
        self.large_step = enable;
    }

    pub fn large_step(&self) -> bool {
        self.large_step
    }

    /// Commit the current proposal.
    pub fn accept(&mut self) {
        if self.large_step {
            self.large_step_time = self.time;
        }
        self.time += 1;
        self.backup.clear();
        self.index = 0;
    }

    /// Discard the current proposal, restoring every coordinate it touched.
    pub fn reject(&mut self) {
        for (i, sample) in self.backup.drain(..).rev() {
            self.samples[i] = sample;
        }
        self.index = 0;
    }

    /// Draw fresh values from `source` until [`end_restore`](Self::end_restore).
    ///
    /// Used with a large step to reproduce a path sampled from another
    /// stream as the current state.
    pub fn begin_restore(&mut self, source: Box<dyn Sampler>) {
        let own = std::mem::replace(&mut self.rng, source);
        self.stashed_rng = Some(own);
    }

    /// Switch back to the owned generator and return the borrowed source.
    pub fn end_restore(&mut self) -> Option<Box<dyn Sampler>> {
        let own = self.stashed_rng.take()?;
        Some(std::mem::replace(&mut self.rng, own))
    }

    /// Values of all coordinates created so far.
    pub fn current_state(&self) -> Vec<f32> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// The first `n` coordinates, zero where none exists yet.
    pub fn current_state_padded(&self, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| self.samples.get(i).map_or(0.0, |s| s.value))
            .collect()
    }

    fn primary_sample(&mut self, i: usize) -> f32 {
        while i >= self.samples.len() {
            let value = self.rng.next();
            self.samples.push(PrimarySample { value, modified: 0 });
        }

        if self.samples[i].modified < self.time {
            if self.large_step {
                self.backup.push((i, self.samples[i]));
                let value = self.rng.next();
                self.samples[i] = PrimarySample {
                    value,
                    modified: self.time,
                };
            } else {
                // Coordinates older than the last accepted large step were
                // replaced by it; there is no history before that time.
                if self.samples[i].modified < self.large_step_time {
                    let value = self.rng.next();
                    self.samples[i] = PrimarySample {
                        value,
                        modified: self.large_step_time,
                    };
                }
                while self.samples[i].modified + 1 < self.time {
                    let value = self.mutate(self.samples[i].value);
                    let sample = &mut self.samples[i];
                    sample.value = value;
                    sample.modified += 1;
                }
                self.backup.push((i, self.samples[i]));
                let value = self.mutate(self.samples[i].value);
                let sample = &mut self.samples[i];
                sample.value = value;
                sample.modified += 1;
            }
        }

        self.samples[i].value
    }

    /// Symmetric exponential perturbation, wrapped to `[0, 1)`.
    fn mutate(&mut self, value: f32) -> f32 {
        let u = self.rng.next();
        let positive = u < 0.5;
        let u = if positive { u * 2.0 } else { 2.0 * (u - 0.5) };
        let dv = self.s2 * (self.log_ratio * u).exp();

        let mut result = value;
        if positive {
            result += dv;
            if result >= 1.0 {
                result -= 1.0;
            }
        } else {
            result -= dv;
            if result < 0.0 {
                result += 1.0;
            }
        }
        // A tiny negative value wraps to 1.0 in f32
        result.min(1.0 - f32::EPSILON)
    }
}

impl Sampler for PrimarySampler {
    fn next(&mut self) -> f32 {
        let i = self.index;
        self.index += 1;
        self.primary_sample(i)
    }

    fn set_seed(&mut self, seed: u64) {
        self.time = 0;
        self.large_step_time = 0;
        self.large_step = false;
        self.index = 0;
        self.samples.clear();
        self.backup.clear();
        self.rng.set_seed(seed);
    }
}
