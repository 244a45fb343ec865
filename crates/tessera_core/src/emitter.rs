//! Emitters: lights and cameras.
//!
//! An emitter is a generalized BSDF that can also sample and evaluate the
//! positional component of its emission (`Le^(0)` for lights, `We^(0)`
//! for cameras). The directional component goes through the ordinary
//! [`GeneralizedBsdf`] interface.

use tessera_math::{Aabb, BoundingSphere, Color, PdfEval, Vec2, Vec3};

use crate::bsdf::{AsGeneralizedBsdf, GeneralizedBsdf};
use crate::film::Film;
use crate::geometry::SurfaceGeometry;
use crate::primitive::Primitive;
use crate::scene::SceneResult;

pub trait Emitter: GeneralizedBsdf + AsGeneralizedBsdf {
    /// Sample a point on the emitter. The pdf is in area measure.
    fn sample_position(&self, sample: Vec2) -> (SurfaceGeometry, PdfEval);

    fn evaluate_position(&self, geom: &SurfaceGeometry) -> Color;

    fn evaluate_position_pdf(&self, geom: &SurfaceGeometry) -> PdfEval;

    /// Called once with every primitive that references this emitter,
    /// before the scene is used for rendering.
    fn register_primitives(&mut self, primitives: &[&Primitive]) -> SceneResult<()>;
}

/// View of an implementor as a plain emitter.
pub trait AsEmitter {
    fn as_emitter(&self) -> &dyn Emitter;
}

impl<T: Emitter> AsEmitter for T {
    fn as_emitter(&self) -> &dyn Emitter {
        self
    }
}

pub trait Light: Emitter + AsEmitter {
    /// True for lights at infinity that are hit through an emitter shape.
    fn environment_light(&self) -> bool {
        false
    }

    /// Called after the scene is built, with the bounds of all geometry.
    fn post_configure(&mut self, _scene_bound: &Aabb) {}

    /// Shape that stands in for the light during intersection.
    fn emitter_shape(&self) -> Option<&BoundingSphere> {
        None
    }
}

pub trait Camera: Emitter + AsEmitter {
    /// Raster position in `[0, 1]^2` of the ray `(p, d)` leaving the camera,
    /// or `None` when it falls outside the sensor.
    fn ray_to_raster_position(&self, p: Vec3, d: Vec3) -> Option<Vec2>;

    /// Film describing the sensor resolution.
    fn film(&self) -> &Film;
}
