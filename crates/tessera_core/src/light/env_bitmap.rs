use std::sync::Arc;

use tessera_math::{
    constants, luminance, sampling, Aabb, BoundingSphere, Color, DiscreteDistribution2D, Mat3,
    PdfEval, Vec2, Vec3,
};

use crate::bsdf::{BsdfType, EvaluateQuery, GeneralizedBsdf, SampleBidirResult, SampleQuery};
use crate::emitter::{Emitter, Light};
use crate::geometry::{SurfaceGeometry, TransportDirection};
use crate::primitive::Primitive;
use crate::scene::SceneResult;
use crate::texture::Texture;

/// Grid used for the sampling distribution of non-image textures.
const DEFAULT_RESOLUTION: u32 = 64;

/// Environment light from an angular map image.
///
/// The texture is in angular map format: the disk inscribed in UV space
/// covers the sphere of directions, with the distance from the center
/// proportional to the angle from the map's `+z` axis. Emission lives on
/// a sphere around the scene like [`ConstantEnvironmentLight`](super::ConstantEnvironmentLight);
/// directions are importance sampled from the map's luminance.
pub struct BitmapEnvironmentLight {
    le: Arc<dyn Texture>,
    /// World to map frame, a rotation about `+y`.
    to_map: Mat3,
    sphere: BoundingSphere,
    distribution: Option<DiscreteDistribution2D>,
}

impl BitmapEnvironmentLight {
    /// `rotate` is the counterclockwise rotation of the map about `+y`
    /// in degrees.
    pub fn new(le: Arc<dyn Texture>, rotate: f32) -> Self {
        let distribution = build_distribution(le.as_ref());
        if distribution.is_none() {
            log::warn!("Environment map has no emission");
        }
        Self {
            le,
            to_map: Mat3::from_rotation_y(-rotate.to_radians()),
            sphere: BoundingSphere {
                center: Vec3::ZERO,
                radius: 1.0,
            },
            distribution,
        }
    }

    pub fn geometry_at(&self, p: Vec3) -> SurfaceGeometry {
        let n = (self.sphere.center - p).normalize();
        SurfaceGeometry::with_normal(p, n)
    }

    /// Radiance arriving from the environment along outgoing direction `d`.
    pub fn radiance(&self, d: Vec3) -> Color {
        self.le.evaluate(direction_to_uv(self.to_map * d))
    }

    /// Solid angle density of sampling the outgoing direction `d`.
    fn direction_pdf(&self, d: Vec3) -> f32 {
        let Some(distribution) = &self.distribution else {
            return 0.0;
        };
        let uv = direction_to_uv(self.to_map * d);
        solid_angle_pdf(distribution.pdf(uv), uv)
    }

    fn accepts(&self, ty: BsdfType, dir: TransportDirection) -> bool {
        ty.intersects(BsdfType::LIGHT_DIRECTION) && dir == TransportDirection::LE
    }
}

/// Map UV of a unit direction in the map frame.
fn direction_to_uv(t: Vec3) -> Vec2 {
    let len = (t.x * t.x + t.y * t.y).sqrt();
    if len <= 0.0 {
        // Straight ahead or straight behind; both map to the center
        return Vec2::splat(0.5);
    }
    let r = constants::INV_PI * t.z.clamp(-1.0, 1.0).acos() / len;
    (Vec2::new(t.x * r, t.y * r) + Vec2::ONE) * 0.5
}

/// Inverse of [`direction_to_uv`]; `None` outside the map disk.
fn uv_to_direction(uv: Vec2) -> Option<Vec3> {
    let p = uv * 2.0 - Vec2::ONE;
    let r = p.length();
    if r > 1.0 {
        return None;
    }
    if r <= 0.0 {
        return Some(Vec3::Z);
    }
    let theta = constants::PI * r;
    let (sin_theta, cos_theta) = theta.sin_cos();
    Some(Vec3::new(sin_theta * p.x / r, sin_theta * p.y / r, cos_theta))
}

/// `sin(theta) / r` with `theta = PI * r`, the area change between the
/// map disk and the sphere of directions up to a factor of `PI`.
fn sin_theta_over_r(r: f32) -> f32 {
    if r < 1e-4 {
        constants::PI
    } else {
        (constants::PI * r).sin() / r
    }
}

/// Convert a density over map UV to solid angle at `uv`.
///
/// `d omega = 4 PI sin(theta) / r  du dv` on the disk.
fn solid_angle_pdf(pdf_uv: f32, uv: Vec2) -> f32 {
    let r = (uv * 2.0 - Vec2::ONE).length();
    let jacobian = 4.0 * constants::PI * sin_theta_over_r(r);
    if r > 1.0 || jacobian <= 0.0 {
        return 0.0;
    }
    pdf_uv / jacobian
}

/// Cell weights proportional to luminance times solid angle.
///
/// Every cell overlapping the disk gets a small floor so that no direction
/// with emission is left without density.
fn build_distribution(le: &dyn Texture) -> Option<DiscreteDistribution2D> {
    let (width, height) = le.resolution().unwrap_or((DEFAULT_RESOLUTION, DEFAULT_RESOLUTION));
    let (width, height) = (width as usize, height as usize);

    let mut cells = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let min = Vec2::new(x as f32 / width as f32, y as f32 / height as f32);
            let max = Vec2::new((x + 1) as f32 / width as f32, (y + 1) as f32 / height as f32);
            // Point of the cell closest to the disk center
            let closest = Vec2::splat(0.5).clamp(min, max);
            let r_min = (closest * 2.0 - Vec2::ONE).length();
            if r_min >= 1.0 {
                cells.push(None);
                continue;
            }
            let lum = luminance(le.evaluate((min + max) * 0.5)).max(0.0);
            cells.push(Some((lum, sin_theta_over_r(r_min))));
        }
    }

    let overlapping = cells.iter().flatten().count();
    if overlapping == 0 {
        return None;
    }
    let mean = cells.iter().flatten().map(|&(lum, _)| lum).sum::<f32>() / overlapping as f32;
    if mean <= 0.0 {
        return None;
    }
    let floor = 0.01 * mean;

    let weights: Vec<f32> = cells
        .iter()
        .map(|cell| cell.map_or(0.0, |(lum, area)| (lum + floor) * area))
        .collect();
    DiscreteDistribution2D::new(&weights, width, height)
}

impl GeneralizedBsdf for BitmapEnvironmentLight {
    fn sample_and_estimate_direction_bidir(
        &self,
        query: &SampleQuery,
        geom: &SurfaceGeometry,
    ) -> Option<SampleBidirResult> {
        if !self.accepts(query.ty, query.transport_dir) {
            return None;
        }

        let (uv, pdf_uv) = self.distribution.as_ref()?.sample(query.sample);
        let d = self.to_map.transpose() * uv_to_direction(uv)?;
        let wo = -d;
        let cos = sampling::cos_theta(geom.to_local(wo));
        let pdf_sa = solid_angle_pdf(pdf_uv, uv);
        if cos <= 0.0 || pdf_sa <= 0.0 {
            return None;
        }

        let pdf_proj = pdf_sa / cos;
        let dir = query.transport_dir.index();
        let inv = query.transport_dir.opposite().index();
        let mut pdf = [PdfEval::default(); 2];
        let mut weight = [Color::ZERO; 2];
        pdf[dir] = PdfEval::projected_solid_angle(pdf_proj);
        pdf[inv] = PdfEval::projected_solid_angle(0.0);
        weight[dir] = self.radiance(d) * constants::INV_PI / pdf_proj;
        Some(SampleBidirResult {
            sampled_type: BsdfType::LIGHT_DIRECTION,
            wo,
            weight,
            pdf,
        })
    }

    fn evaluate_direction(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> Color {
        if !self.accepts(query.ty, query.transport_dir) || sampling::cos_theta(geom.to_local(query.wo)) <= 0.0 {
            return Color::ZERO;
        }
        self.radiance(-query.wo) * constants::INV_PI
    }

    fn evaluate_direction_pdf(&self, query: &EvaluateQuery, geom: &SurfaceGeometry) -> PdfEval {
        let cos = sampling::cos_theta(geom.to_local(query.wo));
        if !self.accepts(query.ty, query.transport_dir) || cos <= 0.0 {
            return PdfEval::projected_solid_angle(0.0);
        }
        PdfEval::projected_solid_angle(self.direction_pdf(-query.wo) / cos)
    }

    fn degenerated(&self) -> bool {
        false
    }

    fn bsdf_types(&self) -> BsdfType {
        BsdfType::LIGHT_DIRECTION
    }
}

impl Emitter for BitmapEnvironmentLight {
    fn sample_position(&self, sample: Vec2) -> (SurfaceGeometry, PdfEval) {
        let p = self.sphere.center + sampling::uniform_sample_sphere(sample) * self.sphere.radius;
        (self.geometry_at(p), PdfEval::area(1.0 / self.sphere.area()))
    }

    fn evaluate_position(&self, _geom: &SurfaceGeometry) -> Color {
        Color::splat(constants::PI)
    }

    fn evaluate_position_pdf(&self, _geom: &SurfaceGeometry) -> PdfEval {
        PdfEval::area(1.0 / self.sphere.area())
    }

    fn register_primitives(&mut self, _primitives: &[&Primitive]) -> SceneResult<()> {
        Ok(())
    }
}

impl Light for BitmapEnvironmentLight {
    fn environment_light(&self) -> bool {
        true
    }

    fn post_configure(&mut self, scene_bound: &Aabb) {
        self.sphere = scene_bound.bounding_sphere();
    }

    fn emitter_shape(&self) -> Option<&BoundingSphere> {
        Some(&self.sphere)
    }
}
