//! Bidirectional path tracing.
//!
//! A light subpath and an eye subpath are sampled independently and every
//! prefix pair `(s, t)` is connected. Each full path is weighted by a
//! [`MisWeight`] over all strategies that could have produced it.

mod fullpath;
mod mis;
mod renderer;
mod subpath;
mod vertex;

pub use fullpath::FullPath;
pub use mis::MisWeight;
pub use renderer::{evaluate_strategies, BptRenderer};
pub use subpath::Subpath;
pub use vertex::{PathVertex, PathVertexPool, VertexType};
