//! Tessera core: scene description, assets and the generalized BSDF
//! contract shared by every light transport algorithm.

pub mod assets;
pub mod bsdf;
pub mod camera;
pub mod config;
pub mod emitter;
pub mod film;
pub mod geometry;
pub mod light;
pub mod logging;
pub mod mesh;
pub mod primitive;
pub mod sampler;
pub mod scene;
pub mod texture;

#[cfg(test)]
pub(crate) mod testing;

pub use assets::{AssetError, AssetResult, Assets};
pub use bsdf::{
    shading_normal_correction, AsGeneralizedBsdf, BsdfType, EvaluateQuery, GeneralizedBsdf,
    SampleBidirResult, SampleQuery, SampleResult,
};
pub use camera::PerspectiveCamera;
pub use config::{Config, ConfigError, ConfigNode, ConfigResult};
pub use emitter::{AsEmitter, Camera, Emitter, Light};
pub use film::{Film, FilmError, FilmResult};
pub use geometry::{Intersection, SurfaceGeometry, TransportDirection};
pub use logging::LogIndenter;
pub use mesh::TriangleMesh;
pub use primitive::{BsdfId, CameraId, LightId, Primitive};
pub use sampler::{PrimarySampler, RandomSampler, RewindableSampler, Sampler, StratifiedSampler};
pub use scene::{AcceleratorKind, Scene, SceneError, SceneResult};
pub use texture::Texture;
