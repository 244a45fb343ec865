use tessera_math::{constants, sampling, Aabb, BoundingSphere, Color, PdfEval, Vec2, Vec3};

use super::area::sample_cosine_emission;
use crate::bsdf::{BsdfType, EvaluateQuery, GeneralizedBsdf, SampleBidirResult, SampleQuery};
use crate::emitter::{Emitter, Light};
use crate::geometry::{SurfaceGeometry, TransportDirection};
use crate::primitive::Primitive;
use crate::scene::SceneResult;

/// Environment light of constant luminance.
///
/// Emission is modeled on a sphere enclosing the scene: positions are
/// uniform on the sphere with inward normals, and directions follow the
/// same cosine distribution as an area light, so a ray that escapes the
/// geometry and hits the sphere receives exactly `le`.
#[derive(Debug, Clone)]
pub struct ConstantEnvironmentLight {
    le: Color,
    sphere: BoundingSphere,
}

impl ConstantEnvironmentLight {
    pub fn new(le: Color) -> Self {
        Self {
            le,
            sphere: BoundingSphere {
                center: Vec3::ZERO,
                radius: 1.0,
            },
        }
    }

    /// Surface geometry on the sphere at `p`, facing inward.
    pub fn geometry_at(&self, p: Vec3) -> SurfaceGeometry {
        let n = (self.sphere.center - p).normalize();
        SurfaceGeometry::with_normal(p, n)
    }

    fn accepts(&self, ty: BsdfType, dir: TransportDirection) -> bool {
        ty.intersects(BsdfType::LIGHT_DIRECTION) && dir == TransportDirection::LE
    }
}

impl GeneralizedBsdf for ConstantEnvironmentLight {
    fn sample_and_estimate_direction_bidir(
        &self,
        query: &SampleQuery,
        geom: &SurfaceGeometry,
    ) -> Option<SampleBidirResult> {
        if !self.accepts(query.ty, query.transport_dir) {
            return None;
        }
        Some(sample_cosine_emission(query, geom))
    }

    fn evaluate_direction(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> Color {
        if !self.accepts(query.ty, query.transport_dir) || sampling::cos_theta(geom.to_local(query.wo)) <= 0.0 {
            return Color::ZERO;
        }
        Color::splat(constants::INV_PI)
    }

    fn evaluate_direction_pdf(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> PdfEval {
        if !self.accepts(query.ty, query.transport_dir) || sampling::cos_theta(geom.to_local(query.wo)) <= 0.0 {
            return PdfEval::projected_solid_angle(0.0);
        }
        sampling::cosine_sample_hemisphere_pdf_proj_sa()
    }

    fn degenerated(&self) -> bool {
        false
    }

    fn bsdf_types(&self) -> BsdfType {
        BsdfType::LIGHT_DIRECTION
    }
}

impl Emitter for ConstantEnvironmentLight {
    fn sample_position(&self, sample: Vec2) -> (SurfaceGeometry, PdfEval) {
        let p = self.sphere.center + sampling::uniform_sample_sphere(sample) * self.sphere.radius;
        (self.geometry_at(p), PdfEval::area(1.0 / self.sphere.area()))
    }

    fn evaluate_position(&self, _geom: &SurfaceGeometry) -> Color {
        self.le * constants::PI
    }

    fn evaluate_position_pdf(&self, _geom: &SurfaceGeometry) -> PdfEval {
        PdfEval::area(1.0 / self.sphere.area())
    }

    fn register_primitives(&mut self, _primitives: &[&Primitive]) -> SceneResult<()> {
        Ok(())
    }
}

impl Light for ConstantEnvironmentLight {
    fn environment_light(&self) -> bool {
        true
    }

    fn post_configure(&mut self, scene_bound: &Aabb) {
        let sphere = scene_bound.bounding_sphere();
        log::debug!(
            "Environment sphere: center {:?}, radius {}",
            sphere.center,
            sphere.radius
        );
        self.sphere = sphere;
    }

    fn emitter_shape(&self) -> Option<&BoundingSphere> {
        Some(&self.sphere)
    }
}
