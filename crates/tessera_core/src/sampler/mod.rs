//! Sources of uniform random numbers consumed by the path samplers.

mod primary;
mod random;
mod rewindable;
mod stratified;

pub use primary::PrimarySampler;
pub use random::{MtSampler, RandomSampler, SfmtSampler};
pub use rewindable::RewindableSampler;
pub use stratified::{StratifiedSampler, MAX_STRATIFIED_DIMENSIONS};

use tessera_math::Vec2;

use crate::config::{ConfigError, ConfigResult};

/// Stream of uniform numbers in `[0, 1)`.
pub trait Sampler: Send {
    fn next(&mut self) -> f32;

    fn next_vec2(&mut self) -> Vec2 {
        let u = self.next();
        let v = self.next();
        Vec2::new(u, v)
    }

    /// Mark the start of a new sample. Only samplers that correlate
    /// values across samples care.
    fn begin_sample(&mut self) {}

    /// Restart the stream from `seed`.
    fn set_seed(&mut self, seed: u64);
}

/// Random sampler backed by the named generator family:
/// `random` (ChaCha, the `rand` standard generator), `mt` (MT19937) or
/// `sfmt` (SIMD-oriented Fast Mersenne Twister).
pub fn create(ty: &str, seed: u64) -> ConfigResult<Box<dyn Sampler>> {
    match ty {
        "random" | "default" => Ok(Box::new(RandomSampler::new(seed))),
        "mt" => Ok(Box::new(MtSampler::with_seed(seed))),
        "sfmt" => Ok(Box::new(SfmtSampler::with_seed(seed))),
        _ => Err(ConfigError::InvalidValue {
            path: "sampler".to_string(),
            message: format!("unknown random number generator '{}'", ty),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(ty: &str, seed: u64) -> Vec<f32> {
        let mut sampler = create(ty, seed).unwrap();
        (0..16).map(|_| sampler.next()).collect()
    }

    #[test]
    fn test_generator_families_differ() {
        let families = ["random", "mt", "sfmt"];
        for (i, a) in families.iter().enumerate() {
            let s = stream(a, 42);
            assert!(s.iter().all(|u| (0.0..1.0).contains(u)));
            assert_eq!(s, stream(a, 42), "{} is not deterministic", a);
            assert_ne!(s, stream(a, 43), "{} ignores its seed", a);
            for b in &families[i + 1..] {
                assert_ne!(s, stream(b, 42), "{} and {} share a stream", a, b);
            }
        }
    }

    #[test]
    fn test_unknown_generator() {
        assert!(create("xorshift", 1).is_err());
    }
}
