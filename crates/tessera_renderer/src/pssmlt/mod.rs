//! Primary sample space Metropolis light transport.
//!
//! A [`PathSampler`] turns a stream of uniform numbers into path
//! contributions ([`Splats`]). The Metropolis renderers run a Markov chain
//! on that stream through a [`PrimarySampler`](tessera_core::PrimarySampler),
//! started from seed paths found in a preprocess.

mod bpt_optimized;
mod path_sampler;
mod renderer;
mod splat;

pub use bpt_optimized::BptOptimizedPssmltRenderer;
pub use path_sampler::{BptPathSampler, PathSampler, PathSamplerKind, PtPathSampler};
pub use renderer::{Estimator, MetropolisParams, PathSeed, PssmltRenderer, SeedCandidates, Transition};
pub use splat::{Splat, Splats};
