//! Photon mapping.
//!
//! Light paths are traced in a preprocess and their non-specular hits are
//! stored in a [`PhotonMap`]. Eye paths follow specular bounces to the
//! first non-specular surface, where radiance is estimated from the k
//! nearest photons with a [`DensityKernel`].

mod kernel;
mod photon_map;
mod renderer;

pub use kernel::DensityKernel;
pub use photon_map::{KdTreePhotonMap, NaivePhotonMap, Photon, PhotonMap};
pub use renderer::PhotonMappingRenderer;
