use tessera_math::{constants, sampling, Color, DiscreteDistribution1D, PdfEval, Vec2, Vec3};

use crate::bsdf::{BsdfType, EvaluateQuery, GeneralizedBsdf, SampleBidirResult, SampleQuery};
use crate::emitter::{Emitter, Light};
use crate::geometry::{SurfaceGeometry, TransportDirection};
use crate::primitive::Primitive;
use crate::scene::{SceneError, SceneResult};

/// Diffuse emitter attached to triangle meshes.
#[derive(Debug, Clone)]
pub struct AreaLight {
    le: Color,
    /// World-space triangles of all registered primitives
    triangles: Vec<[Vec3; 3]>,
    triangle_area_cdf: DiscreteDistribution1D,
    area: f32,
    inv_area: f32,
    testing_area: Option<f32>,
}

impl AreaLight {
    pub fn new(le: Color) -> Self {
        Self {
            le,
            triangles: Vec::new(),
            triangle_area_cdf: DiscreteDistribution1D::new(),
            area: 0.0,
            inv_area: 0.0,
            testing_area: None,
        }
    }

    /// Replace the surface area used for the positional pdf.
    pub fn set_testing_area(&mut self, area: f32) {
        self.testing_area = Some(area);
        self.area = area;
        self.inv_area = 1.0 / area;
    }

    pub fn area(&self) -> f32 {
        self.area
    }

    /// Total emitted power.
    pub fn power(&self) -> Color {
        self.le * (constants::PI * self.area)
    }

    fn accepts(&self, ty: BsdfType, dir: TransportDirection) -> bool {
        ty.intersects(BsdfType::LIGHT_DIRECTION) && dir == TransportDirection::LE
    }
}

/// Cosine-distributed emission shared by the area and environment lights.
pub(super) fn sample_cosine_emission(query: &SampleQuery, geom: &SurfaceGeometry) -> SampleBidirResult {
    let local_wo = sampling::cosine_sample_hemisphere(query.sample);
    let dir = query.transport_dir.index();
    let inv = query.transport_dir.opposite().index();
    let mut pdf = [PdfEval::default(); 2];
    let mut weight = [Color::ZERO; 2];
    pdf[dir] = sampling::cosine_sample_hemisphere_pdf_proj_sa();
    pdf[inv] = PdfEval::projected_solid_angle(0.0);
    weight[dir] = Color::ONE;
    SampleBidirResult {
        sampled_type: BsdfType::LIGHT_DIRECTION,
        wo: geom.to_world(local_wo),
        weight,
        pdf,
    }
}

impl GeneralizedBsdf for AreaLight {
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

impl Emitter for AreaLight {
    fn sample_position(&self, sample: Vec2) -> (SurfaceGeometry, PdfEval) {
        let (index, v) = self.triangle_area_cdf.sample_reuse(sample.y);
        let [p1, p2, p3] = self.triangles[index];
        let b = sampling::uniform_sample_triangle(Vec2::new(sample.x, v));
        let p = p1 * (1.0 - b.x - b.y) + p2 * b.x + p3 * b.y;
        let gn = (p2 - p1).cross(p3 - p1).normalize();
        (SurfaceGeometry::with_normal(p, gn), PdfEval::area(self.inv_area))
    }

    fn evaluate_position(&self, _geom: &SurfaceGeometry) -> Color {
        self.le * constants::PI
    }

    fn evaluate_position_pdf(&self, _geom: &SurfaceGeometry) -> PdfEval {
        PdfEval::area(self.inv_area)
    }

    fn register_primitives(&mut self, primitives: &[&Primitive]) -> SceneResult<()> {
        self.triangles.clear();
        self.triangle_area_cdf.clear();

        for primitive in primitives {
            let Some(mesh) = &primitive.mesh else {
                return Err(SceneError::Registration(
                    "area light must be attached to a triangle mesh".to_string(),
                ));
            };
            for f in 0..mesh.num_faces() {
                let [i1, i2, i3] = mesh.face(f);
                let p1 = primitive.transform.transform_point3(mesh.positions[i1]);
                let p2 = primitive.transform.transform_point3(mesh.positions[i2]);
                let p3 = primitive.transform.transform_point3(mesh.positions[i3]);
                self.triangles.push([p1, p2, p3]);
                self.triangle_area_cdf.add((p2 - p1).cross(p3 - p1).length() * 0.5);
            }
        }

        let area = self.triangle_area_cdf.sum();
        if !self.triangle_area_cdf.normalize() {
            return Err(SceneError::Registration(
                "area light has no surface area".to_string(),
            ));
        }
        match self.testing_area {
            Some(area) => self.set_testing_area(area),
            None => {
                self.area = area;
                self.inv_area = 1.0 / area;
            }
        }

        log::debug!(
            "Area light registered {} triangles (area {})",
            self.triangles.len(),
            self.area
        );
        Ok(())
    }
}

impl Light for AreaLight {}
