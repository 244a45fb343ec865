//! Tessera math kernel.
//!
//! Vectors and matrices come straight from glam. On top of that this crate
//! provides the handful of types every light transport routine touches:
//! rays, bounds, measure-tagged probability densities, sampling warps and
//! discrete distributions.

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod color;
mod distribution;
mod pdf;
mod ray;

pub mod constants;
pub mod sampling;
pub mod transform;

pub use aabb::{Aabb, BoundingSphere};
pub use color::{is_zero, luminance, Color};
pub use distribution::{DiscreteDistribution1D, DiscreteDistribution2D};
pub use pdf::{projected_to_solid_angle, PdfEval, ProbabilityMeasure};
pub use ray::Ray;
pub use transform::Mat4Ext;
