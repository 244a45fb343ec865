use tessera_core::Film;
use tessera_math::{luminance, Color, Vec2};

/// One contribution of a sampled path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    /// Light subpath vertices of the strategy, zero for unidirectional samplers.
    pub s: usize,
    /// Eye subpath vertices of the strategy.
    pub t: usize,
    pub raster: Vec2,
    pub l: Color,
}

/// Everything a path sampler produced from one point of primary sample space.
///
/// A bidirectional sampler yields one splat per connecting strategy, each
/// landing on its own raster position.
#[derive(Debug, Clone, Default)]
pub struct Splats {
    pub splats: Vec<Splat>,
}

impl Splats {
    pub fn clear(&mut self) {
        self.splats.clear();
    }

    pub fn push(&mut self, splat: Splat) {
        self.splats.push(splat);
    }

    /// Scalar contribution `I` the Markov chain targets.
    pub fn sum_luminance(&self) -> f32 {
        self.splats.iter().map(|splat| luminance(splat.l)).sum()
    }

    pub fn accumulate_to(&self, film: &mut Film, weight: f32) {
        for splat in &self.splats {
            film.accumulate_contribution(splat.raster, splat.l * weight);
        }
    }
}
