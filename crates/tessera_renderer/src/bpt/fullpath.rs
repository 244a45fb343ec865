use tessera_core::{
    BsdfType, EvaluateQuery, GeneralizedBsdf, Scene, SurfaceGeometry, TransportDirection,
};
use tessera_math::{constants, is_zero, Color, PdfEval, ProbabilityMeasure, Vec2, Vec3};

use super::subpath::Subpath;
use super::vertex::{PathVertex, PathVertexPool};
use crate::utils::generalized_geometry_term;

const PSA_ZERO: PdfEval = PdfEval::zero(ProbabilityMeasure::ProjectedSolidAngle);

const EL: usize = TransportDirection::EL as usize;
const LE: usize = TransportDirection::LE as usize;

fn direction_pdf_of(
    bsdf: Option<&dyn GeneralizedBsdf>,
    query: &EvaluateQuery,
    geom: &SurfaceGeometry,
) -> PdfEval {
    bsdf.map_or(PSA_ZERO, |bsdf| bsdf.evaluate_direction_pdf(query, geom))
}

/// Full path `x_0 .. x_{n-1}` made of the first `s` light subpath vertices
/// and the first `t` eye subpath vertices.
///
/// Directional densities of the two connection vertices depend on the
/// connection itself and are evaluated once on construction: `pdf_dl`
/// belongs to `y_{s-1}` and `pdf_de` to `z_{t-1}`.
pub struct FullPath<'p, 'a> {
    pub s: usize,
    pub t: usize,
    pool: &'p PathVertexPool<'a>,
    light: &'p Subpath,
    eye: &'p Subpath,
    pdf_dl: [PdfEval; 2],
    pdf_de: [PdfEval; 2],
}

impl<'p, 'a> FullPath<'p, 'a> {
    pub fn new(
        s: usize,
        t: usize,
        pool: &'p PathVertexPool<'a>,
        light: &'p Subpath,
        eye: &'p Subpath,
    ) -> Self {
        debug_assert!(s + t >= 2);
        let mut pdf_dl = [PSA_ZERO; 2];
        let mut pdf_de = [PSA_ZERO; 2];

        if s == 0 {
            let z = eye.vertex(pool, t - 1);
            let z_prev = eye.vertex(pool, t - 2);
            if let Some(area_light) = z.area_light {
                if !z_prev.geom.degenerated {
                    let query = EvaluateQuery::new(
                        BsdfType::LIGHT_DIRECTION,
                        TransportDirection::LE,
                        Vec3::ZERO,
                        z.wi,
                    );
                    pdf_de[LE] = area_light.evaluate_direction_pdf(&query, &z.geom);
                }
            }
        } else if t == 0 {
            let y = light.vertex(pool, s - 1);
            let y_prev = light.vertex(pool, s - 2);
            if let Some(area_camera) = y.area_camera {
                if !y_prev.geom.degenerated {
                    let query = EvaluateQuery::new(
                        BsdfType::EYE_DIRECTION,
                        TransportDirection::EL,
                        Vec3::ZERO,
                        y.wi,
                    );
                    pdf_dl[EL] = area_camera.evaluate_direction_pdf(&query, &y.geom);
                }
            }
        } else {
            let y = light.vertex(pool, s - 1);
            let z = eye.vertex(pool, t - 1);
            let y_prev = (s > 1).then(|| light.vertex(pool, s - 2));
            let z_prev = (t > 1).then(|| eye.vertex(pool, t - 2));
            let yz = (z.geom.p - y.geom.p).normalize();
            let zy = -yz;

            if y_prev.is_some_and(|v| !v.geom.degenerated) {
                let query = EvaluateQuery::new(BsdfType::ALL, TransportDirection::EL, yz, y.wi);
                pdf_dl[EL] = direction_pdf_of(y.bsdf, &query, &y.geom);
            }
            if !z.geom.degenerated {
                let query = EvaluateQuery::new(BsdfType::ALL, TransportDirection::LE, y.wi, yz);
                pdf_dl[LE] = direction_pdf_of(y.bsdf, &query, &y.geom);
            }
            if z_prev.is_some_and(|v| !v.geom.degenerated) {
                let query = EvaluateQuery::new(BsdfType::ALL, TransportDirection::LE, zy, z.wi);
                pdf_de[LE] = direction_pdf_of(z.bsdf, &query, &z.geom);
            }
            if !y.geom.degenerated {
                let query = EvaluateQuery::new(BsdfType::ALL, TransportDirection::EL, z.wi, zy);
                pdf_de[EL] = direction_pdf_of(z.bsdf, &query, &z.geom);
            }
        }

        Self {
            s,
            t,
            pool,
            light,
            eye,
            pdf_dl,
            pdf_de,
        }
    }

    pub fn len(&self) -> usize {
        self.s + self.t
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contribution `C*_{s,t}` without the MIS weight, with the raster
    /// position it lands on. `None` for paths that carry nothing.
    pub fn evaluate_unweight_contribution(&self, scene: &Scene) -> Option<(Color, Vec2)> {
        let (alpha_l, _) = self.light.evaluate_subpath_alpha(scene, self.pool, self.s);
        if is_zero(alpha_l) {
            return None;
        }
        let (alpha_e, mut raster) = self.eye.evaluate_subpath_alpha(scene, self.pool, self.t);
        if is_zero(alpha_e) {
            return None;
        }

        let cst = if self.s == 0 {
            // z_{t-1} lies on a light
            let v = self.eye.vertex(self.pool, self.t - 1);
            let area_light = v.area_light?;
            let query = EvaluateQuery::new(BsdfType::ALL_EMITTER, TransportDirection::LE, Vec3::ZERO, v.wi);
            area_light.evaluate_position(&v.geom) * area_light.evaluate_direction(&query, &v.geom)
        } else if self.t == 0 {
            // y_{s-1} lies on a camera
            let v = self.light.vertex(self.pool, self.s - 1);
            let area_camera = v.area_camera?;
            raster = Some(area_camera.ray_to_raster_position(v.geom.p, v.wi)?);
            let query = EvaluateQuery::new(BsdfType::ALL_EMITTER, TransportDirection::EL, Vec3::ZERO, v.wi);
            area_camera.evaluate_position(&v.geom) * area_camera.evaluate_direction(&query, &v.geom)
        } else {
            let vl = self.light.vertex(self.pool, self.s - 1);
            let ve = self.eye.vertex(self.pool, self.t - 1);
            if vl.degenerated() || ve.degenerated() {
                return None;
            }
            let (bsdf_l, bsdf_e) = (vl.bsdf?, ve.bsdf?);

            let pl_pe = ve.geom.p - vl.geom.p;
            let length = pl_pe.length();
            if length < constants::EPS {
                return None;
            }
            let d = pl_pe / length;
            if self.t == 1 {
                raster = Some(scene.main_camera().ray_to_raster_position(ve.geom.p, -d)?);
            }
            if !scene.visible(vl.geom.p, ve.geom.p) {
                return None;
            }

            let fs_l = bsdf_l.evaluate_direction(
                &EvaluateQuery::new(BsdfType::ALL, TransportDirection::LE, vl.wi, d),
                &vl.geom,
            );
            let fs_e = bsdf_e.evaluate_direction(
                &EvaluateQuery::new(BsdfType::ALL, TransportDirection::EL, ve.wi, -d),
                &ve.geom,
            );
            fs_l * generalized_geometry_term(&vl.geom, &ve.geom) * fs_e
        };

        if is_zero(cst) {
            return None;
        }
        Some((alpha_l * cst * alpha_e, raster?))
    }

    /// Vertex `x_i` of the full path, counted from the light.
    pub fn full_path_vertex(&self, i: usize) -> &'p PathVertex<'a> {
        debug_assert!(i < self.len());
        if i < self.s {
            self.light.vertex(self.pool, i)
        } else {
            self.eye.vertex(self.pool, self.t - 1 - (i - self.s))
        }
    }

    /// Directional density at `x_i` toward its neighbour in `transport_dir`.
    pub fn full_path_vertex_direction_pdf(&self, i: usize, transport_dir: TransportDirection) -> PdfEval {
        let pdf = if i + 1 == self.s {
            self.pdf_dl[transport_dir.index()]
        } else if i == self.s {
            self.pdf_de[transport_dir.index()]
        } else {
            self.full_path_vertex(i).pdf_d[transport_dir.index()]
        };
        debug_assert_eq!(pdf.measure, ProbabilityMeasure::ProjectedSolidAngle);
        pdf
    }

    fn pdf_le(&self, i: usize) -> f32 {
        self.full_path_vertex_direction_pdf(i, TransportDirection::LE).v
    }

    fn pdf_el(&self, i: usize) -> f32 {
        self.full_path_vertex_direction_pdf(i, TransportDirection::EL).v
    }

    fn geometry_term(&self, i: usize, j: usize) -> f32 {
        generalized_geometry_term(&self.full_path_vertex(i).geom, &self.full_path_vertex(j).geom)
    }

    /// Area-measure density `p_i` of sampling this path with `i` light
    /// and `n - i` eye vertices.
    pub fn evaluate_fullpath_pdf(&self, i: usize) -> f32 {
        let n = self.len();
        if 0 < i && i < n {
            // A delta connection vertex cannot be sampled by p_i
            if self.full_path_vertex(i - 1).degenerated() || self.full_path_vertex(i).degenerated() {
                return 0.0;
            }
        }

        let mut pdf = 1.0;
        if i > 0 {
            pdf *= self.full_path_vertex(0).pdf_p.value_in(ProbabilityMeasure::Area);
            for j in 0..i - 1 {
                pdf *= self.pdf_le(j) * self.geometry_term(j, j + 1);
            }
        }
        if i < n {
            pdf *= self.full_path_vertex(n - 1).pdf_p.value_in(ProbabilityMeasure::Area);
            for j in (i + 1..n).rev() {
                pdf *= self.pdf_el(j) * self.geometry_term(j, j - 1);
            }
        }

        if pdf.is_finite() {
            pdf
        } else {
            0.0
        }
    }

    /// `p_{i+1} / p_i`, evaluated from the edges around `x_i` only.
    ///
    /// Returns zero when the denominator vanishes.
    pub fn evaluate_fullpath_pdf_ratio(&self, i: usize) -> f32 {
        let n = self.len();
        let (numerator, denominator) = if i == 0 {
            (
                self.full_path_vertex(0).pdf_p.value_in(ProbabilityMeasure::Area),
                self.pdf_el(1) * self.geometry_term(0, 1),
            )
        } else if i == n - 1 {
            (
                self.pdf_le(n - 2) * self.geometry_term(n - 2, n - 1),
                self.full_path_vertex(n - 1).pdf_p.value_in(ProbabilityMeasure::Area),
            )
        } else {
            (
                self.pdf_le(i - 1) * self.geometry_term(i - 1, i),
                self.pdf_el(i + 1) * self.geometry_term(i + 1, i),
            )
        };

        if denominator.abs() < constants::EPS {
            return 0.0;
        }
        numerator / denominator
    }

    /// True when `p_i` is known to vanish without evaluating it.
    pub fn fullpath_pdf_is_zero(&self, i: usize) -> bool {
        if i == self.s {
            return false;
        }
        let n = self.len();
        if i == 0 {
            let x0 = self.full_path_vertex(0);
            x0.area_light.is_none() || x0.geom.degenerated
        } else if i == n {
            let xn = self.full_path_vertex(n - 1);
            xn.area_camera.is_none() || xn.geom.degenerated
        } else {
            self.full_path_vertex(i - 1).degenerated() || self.full_path_vertex(i).degenerated()
        }
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use std::sync::Arc;

    use tessera_core::bsdf::DiffuseBsdf;
    use tessera_core::light::AreaLight;
    use tessera_core::texture::ConstantTexture;
    use tessera_core::{Emitter, Film, PerspectiveCamera};
    use tessera_math::transform;

    use super::*;
    use crate::bpt::vertex::VertexType;

    /// A light at the origin facing up, a diffuse ceiling point at
    /// `(1, 1, 0)`, a diffuse floor point at `(1, 0, 0)` and a pinhole at
    /// `(2, 1, 0)` looking at the floor point.
    pub struct CanonicalPath {
        light: AreaLight,
        camera: PerspectiveCamera,
        white: DiffuseBsdf,
    }

    impl CanonicalPath {
        pub fn new() -> Self {
            let mut light = AreaLight::new(Color::ONE);
            light.set_testing_area(1.0);
            let mut camera = PerspectiveCamera::new(90.0, 1.0, Film::new(1, 1));
            camera.set_view(transform::look_at(
                Vec3::new(2.0, 1.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::Y,
            ));
            let white = DiffuseBsdf::new(Arc::new(ConstantTexture::new(Color::ONE)));
            Self {
                light,
                camera,
                white,
            }
        }

        /// Bare vertices `x_0 .. x_3`, light first.
        fn points(&self) -> [PathVertex<'_>; 4] {
            let light_geom = SurfaceGeometry::with_normal(Vec3::ZERO, Vec3::Y);
            let camera_geom = SurfaceGeometry::degenerated_at(Vec3::new(2.0, 1.0, 0.0));
            [
                PathVertex {
                    geom: light_geom,
                    emitter: Some(&self.light),
                    area_light: Some(&self.light),
                    pdf_p: self.light.evaluate_position_pdf(&light_geom),
                    ..Default::default()
                },
                PathVertex {
                    geom: SurfaceGeometry::with_normal(Vec3::new(1.0, 1.0, 0.0), -Vec3::Y),
                    bsdf: Some(&self.white),
                    ..Default::default()
                },
                PathVertex {
                    geom: SurfaceGeometry::with_normal(Vec3::new(1.0, 0.0, 0.0), Vec3::Y),
                    bsdf: Some(&self.white),
                    ..Default::default()
                },
                PathVertex {
                    geom: camera_geom,
                    emitter: Some(&self.camera),
                    pdf_p: self.camera.evaluate_position_pdf(&camera_geom),
                    ..Default::default()
                },
            ]
        }

        /// Split the path into a light subpath of `s` vertices and an eye
        /// subpath of `4 - s` vertices, as if each had been sampled.
        pub fn split(&self, s: usize) -> (PathVertexPool<'_>, Subpath, Subpath) {
            split_vertices(&self.points(), s)
        }
    }

    /// Rebuild the subpaths of the full path `xs` (light first) for the
    /// strategy with `s` light vertices.
    ///
    /// Endpoints use their emitter as BSDF; every other vertex keeps its
    /// own. Directions and directional densities are recomputed the way
    /// [`Subpath::sample`] records them.
    pub fn split_vertices<'a>(xs: &[PathVertex<'a>], s: usize) -> (PathVertexPool<'a>, Subpath, Subpath) {
        let n = xs.len();
        let toward = |from: usize, to: usize| (xs[to].geom.p - xs[from].geom.p).normalize();
        let pdf = |v: &PathVertex<'_>, dir: TransportDirection, wi: Vec3, wo: Vec3| {
            direction_pdf_of(v.bsdf, &EvaluateQuery::new(BsdfType::ALL, dir, wi, wo), &v.geom)
        };
        let reset = |mut v: PathVertex<'a>, dir: TransportDirection| {
            v.transport_dir = dir;
            v.wi = Vec3::ZERO;
            v.wo = Vec3::ZERO;
            v.pdf_d = [PSA_ZERO; 2];
            v
        };

        let mut pool = PathVertexPool::new();
        let mut light = Subpath::new(TransportDirection::LE);
        let mut eye = Subpath::new(TransportDirection::EL);

        for j in 0..s {
            let mut v = reset(xs[j], TransportDirection::LE);
            v.ty = if j == 0 { VertexType::EndPoint } else { VertexType::Intermediate };
            if j == 0 {
                v.bsdf = v.emitter.map(|e| e.as_generalized_bsdf());
            } else {
                v.wi = toward(j, j - 1);
            }
            if j + 1 < s {
                v.wo = toward(j, j + 1);
                v.pdf_d[LE] = pdf(&v, TransportDirection::LE, v.wi, v.wo);
                if j > 0 && !xs[j - 1].geom.degenerated {
                    v.pdf_d[EL] = pdf(&v, TransportDirection::EL, v.wo, v.wi);
                }
            }
            light.vertices.push(pool.push(v));
        }

        for k in 0..n - s {
            let i = n - 1 - k;
            let mut v = reset(xs[i], TransportDirection::EL);
            v.ty = if k == 0 { VertexType::EndPoint } else { VertexType::Intermediate };
            if k == 0 {
                v.bsdf = v.emitter.map(|e| e.as_generalized_bsdf());
            } else {
                v.wi = toward(i, i + 1);
            }
            if k + 1 < n - s {
                v.wo = toward(i, i - 1);
                v.pdf_d[EL] = pdf(&v, TransportDirection::EL, v.wi, v.wo);
                if k > 0 && !xs[i + 1].geom.degenerated {
                    v.pdf_d[LE] = pdf(&v, TransportDirection::LE, v.wo, v.wi);
                }
            }
            eye.vertices.push(pool.push(v));
        }

        (pool, light, eye)
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::CanonicalPath;
    use super::*;
    use tessera_math::constants::PI;

    fn assert_near(expected: f32, actual: f32) {
        let tolerance = 1e-4 * expected.abs().max(1.0);
        assert!(
            (expected - actual).abs() < tolerance,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_canonical_fullpath_pdf() {
        let canonical = CanonicalPath::new();
        let (pool, light, eye) = canonical.split(2);
        let path = FullPath::new(2, 2, &pool, &light, &eye);
        let sqrt2 = 2f32.sqrt();

        assert_near(sqrt2 / (64.0 * PI * PI), path.evaluate_fullpath_pdf(0));
        assert_near(sqrt2 / (16.0 * PI), path.evaluate_fullpath_pdf(1));
        assert_near(sqrt2 / (64.0 * PI), path.evaluate_fullpath_pdf(2));
        assert_near(1.0 / (4.0 * PI * PI), path.evaluate_fullpath_pdf(3));
        assert_near(0.0, path.evaluate_fullpath_pdf(4));
    }

    #[test]
    fn test_canonical_fullpath_pdf_ratio() {
        let canonical = CanonicalPath::new();
        let (pool, light, eye) = canonical.split(2);
        let path = FullPath::new(2, 2, &pool, &light, &eye);

        assert_near(4.0 * PI, path.evaluate_fullpath_pdf_ratio(0));
        assert_near(0.25, path.evaluate_fullpath_pdf_ratio(1));
        assert_near(8.0 * 2f32.sqrt() / PI, path.evaluate_fullpath_pdf_ratio(2));
        assert_near(0.0, path.evaluate_fullpath_pdf_ratio(3));
    }

    #[test]
    fn test_ratio_matches_pdf_quotient() {
        let canonical = CanonicalPath::new();
        let (pool, light, eye) = canonical.split(2);
        for s in 0..=2 {
            for t in 0..=2 {
                let n = s + t;
                if n < 2 {
                    continue;
                }
                let path = FullPath::new(s, t, &pool, &light, &eye);
                for i in 0..n {
                    let pi = path.evaluate_fullpath_pdf(i);
                    let pi_next = path.evaluate_fullpath_pdf(i + 1);
                    let ratio = path.evaluate_fullpath_pdf_ratio(i);
                    if pi.abs() < constants::EPS {
                        assert!(ratio.abs() < constants::EPS, "s={} t={} i={}: {}", s, t, i, ratio);
                    } else {
                        assert_near(pi_next / pi, ratio);
                    }
                }
            }
        }
    }

    #[test]
    fn test_pdfs_agree_across_splits() {
        let canonical = CanonicalPath::new();
        let (pool, light, eye) = canonical.split(2);
        let reference = FullPath::new(2, 2, &pool, &light, &eye);
        for s in 0..4 {
            let (pool, light, eye) = canonical.split(s);
            let path = FullPath::new(s, 4 - s, &pool, &light, &eye);
            for i in 0..=4 {
                assert_near(reference.evaluate_fullpath_pdf(i), path.evaluate_fullpath_pdf(i));
            }
        }
    }

    #[test]
    fn test_zero_pdf_strategies() {
        let canonical = CanonicalPath::new();
        let (pool, light, eye) = canonical.split(2);
        let path = FullPath::new(2, 2, &pool, &light, &eye);
        // A pinhole cannot be hit by a light subpath
        assert!(path.fullpath_pdf_is_zero(4));
        assert!((0..4).all(|i| !path.fullpath_pdf_is_zero(i)));
        assert_eq!(path.full_path_vertex(3).geom.p, Vec3::new(2.0, 1.0, 0.0));
        assert_eq!(path.full_path_vertex(2).geom.p, Vec3::new(1.0, 0.0, 0.0));
    }
}
