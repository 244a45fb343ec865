use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_core::sampler::{self, Sampler, StratifiedSampler};
use tessera_core::ConfigNode;

use crate::{RenderError, RenderResult};

/// Kind of per-process sampler a renderer hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SamplerKind {
    Random,
    /// Jittered stratification over sets of `strata * strata` samples.
    Stratified { strata: usize },
}

/// The `sampler` element of a renderer.
///
/// Hands out seeds so that every render process, and every auxiliary
/// sampler a renderer needs, gets its own deterministic stream.
pub(crate) struct InitialSampler {
    kind: SamplerKind,
    rng_type: String,
    seeds: Mutex<StdRng>,
}

impl InitialSampler {
    /// Read `sampler { type: "random" | "stratified", rng, rng_seed, strata }`.
    ///
    /// A negative or missing `rng_seed` seeds from the clock.
    pub fn configure(node: &ConfigNode<'_>) -> RenderResult<Self> {
        let sampler_node = node.child("sampler").ok_or_else(|| {
            RenderError::Invalid("missing 'sampler' element".to_string())
        })?;
        let kind = match sampler_node.required_attribute("type")? {
            "random" => SamplerKind::Random,
            "stratified" => {
                let strata: i64 = sampler_node.child_value_or_default("strata", 4)?;
                if strata <= 0 {
                    return Err(RenderError::Invalid(format!("strata = {}", strata)));
                }
                SamplerKind::Stratified {
                    strata: strata as usize,
                }
            }
            ty => {
                log::error!("Invalid sampler type '{}'", ty);
                return Err(RenderError::Invalid(format!("unsupported sampler type '{}'", ty)));
            }
        };

        let rng_type: String = sampler_node.child_value_or_default("rng", "sfmt".to_string())?;
        // Reject unknown generator families up front
        sampler::create(&rng_type, 0)?;

        let seed: i64 = sampler_node.child_value_or_default("rng_seed", -1)?;
        let seed = if seed < 0 {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default()
        } else {
            seed as u64
        };
        log::debug!("Sampler {:?} ('{}') seeded with {}", kind, rng_type, seed);

        Ok(Self {
            kind,
            rng_type,
            seeds: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Like [`configure`](Self::configure) for renderers whose sample
    /// streams cannot be stratified.
    pub fn configure_random(node: &ConfigNode<'_>) -> RenderResult<Self> {
        let initial_sampler = Self::configure(node)?;
        if initial_sampler.kind() != SamplerKind::Random {
            log::error!("Invalid sampler type. This renderer requires 'random' sampler");
            return Err(RenderError::Invalid("this renderer requires a 'random' sampler".to_string()));
        }
        Ok(initial_sampler)
    }

    pub fn kind(&self) -> SamplerKind {
        self.kind
    }

    pub fn next_seed(&self) -> u64 {
        self.seeds.lock().unwrap_or_else(PoisonError::into_inner).gen()
    }

    /// Uniform number from the seed stream.
    pub fn next(&self) -> f32 {
        self.seeds.lock().unwrap_or_else(PoisonError::into_inner).gen()
    }

    /// Fresh per-process sampler of the configured kind with the next seed.
    pub fn create_sampler(&self) -> RenderResult<Box<dyn Sampler>> {
        match self.kind {
            SamplerKind::Random => self.create_random_sampler(),
            SamplerKind::Stratified { strata } => {
                Ok(Box::new(StratifiedSampler::new(self.next_seed(), strata)))
            }
        }
    }

    /// Fresh random sampler of the configured generator family, whatever
    /// the sampler kind.
    pub fn create_random_sampler(&self) -> RenderResult<Box<dyn Sampler>> {
        Ok(sampler::create(&self.rng_type, self.next_seed())?)
    }
}
