use tessera_math::{constants, Vec3};

use super::photon_map::Photon;
use crate::{RenderError, RenderResult};

/// Photon density estimation kernel.
///
/// A kernel is evaluated for a photon within the query radius `r` and is
/// normalized so that `k / r^2` integrates to one over the query disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensityKernel {
    Simpson,
    Gaussian,
    Cone,
}

impl DensityKernel {
    pub fn from_name(name: &str) -> RenderResult<Self> {
        match name {
            "simpson" => Ok(DensityKernel::Simpson),
            "gaussian" => Ok(DensityKernel::Gaussian),
            "cone" => Ok(DensityKernel::Cone),
            _ => {
                log::error!("Unsupported photon density estimation kernel type '{}'", name);
                Err(RenderError::Invalid(format!("unknown kernel '{}'", name)))
            }
        }
    }

    /// Weight of `photon` for the query point `p` with squared radius `max_dist2`.
    pub fn evaluate(&self, p: Vec3, photon: &Photon, max_dist2: f32) -> f32 {
        let dist2 = p.distance_squared(photon.p);
        match self {
            DensityKernel::Simpson => {
                let s = 1.0 - dist2 / max_dist2;
                3.0 * constants::INV_PI * s * s
            }
            DensityKernel::Gaussian => {
                // Jensen's normalized Gaussian filter
                const ALPHA: f32 = 1.818;
                const BETA: f32 = 1.953;
                let t = 1.0 - (-BETA * dist2 / (2.0 * max_dist2)).exp();
                ALPHA * (1.0 - t / (1.0 - (-BETA).exp())) * constants::INV_PI
            }
            DensityKernel::Cone => {
                const K: f32 = 1.1;
                let t = 1.0 - dist2.sqrt() / (K * max_dist2.sqrt());
                t / (1.0 - 2.0 / (3.0 * K)) * constants::INV_PI
            }
        }
    }
}
