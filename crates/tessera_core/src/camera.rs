//! Camera assets.

use tessera_math::{constants, transform, Color, Mat4, PdfEval, Vec2, Vec3, Vec4};

use crate::assets::{AssetError, AssetResult, Assets};
use crate::bsdf::{BsdfType, EvaluateQuery, GeneralizedBsdf, SampleBidirResult, SampleQuery};
use crate::config::ConfigNode;
use crate::emitter::{Camera, Emitter};
use crate::film::Film;
use crate::geometry::SurfaceGeometry;
use crate::primitive::Primitive;
use crate::scene::{SceneError, SceneResult};

/// Pinhole camera with an OpenGL-style perspective projection.
///
/// The camera looks down its local -z axis. Its importance is normalized
/// over a virtual sensor at distance one, so that `We^(1)` equals the
/// directional pdf of [`GeneralizedBsdf::sample_direction`].
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    film: Film,
    projection: Mat4,
    inv_projection: Mat4,
    view: Mat4,
    inv_view: Mat4,
    position: Vec3,
    /// Inverse sensor area at distance one
    inv_a: f32,
}

impl PerspectiveCamera {
    pub fn new(fovy_degrees: f32, aspect: f32, film: Film) -> Self {
        let projection = transform::perspective(fovy_degrees, aspect, 1.0, 1000.0);
        let inv_projection = projection.inverse();

        let mut p1 = inv_projection.project_point3(Vec3::new(-1.0, -1.0, 0.0));
        let mut p2 = inv_projection.project_point3(Vec3::new(1.0, 1.0, 0.0));
        p1 /= p1.z;
        p2 /= p2.z;
        let a = (p2.x - p1.x) * (p2.y - p1.y);

        let mut camera = Self {
            film,
            projection,
            inv_projection,
            view: Mat4::IDENTITY,
            inv_view: Mat4::IDENTITY,
            position: Vec3::ZERO,
            inv_a: 1.0 / a,
        };
        camera.set_view(Mat4::IDENTITY);
        camera
    }

    /// Set the world-to-camera matrix.
    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
        self.inv_view = view.inverse();
        self.position = self.inv_view.transform_point3(Vec3::ZERO);
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Importance for a direction at angle `cos_theta` to the view axis.
    fn importance(&self, mut cos_theta: f32) -> f32 {
        if cos_theta <= 0.0 {
            return 0.0;
        }
        // 1/cos^3 amplifies rounding near the axis
        if (cos_theta - 1.0).abs() < constants::EPS_LARGE {
            cos_theta = 1.0;
        }
        let inv_cos = 1.0 / cos_theta;
        self.inv_a * inv_cos * inv_cos * inv_cos
    }

    /// Importance of the direction `wo` leaving the pinhole, zero outside
    /// the sensor.
    fn directional_importance(&self, ty: BsdfType, wo: Vec3) -> f32 {
        if !ty.intersects(BsdfType::EYE_DIRECTION)
            || self.ray_to_raster_position(self.position, wo).is_none()
        {
            return 0.0;
        }
        let ref_cam = self.view.transform_point3(self.position + wo).normalize();
        self.importance(-ref_cam.z)
    }
}

impl GeneralizedBsdf for PerspectiveCamera {
    fn sample_and_estimate_direction_bidir(
        &self,
        query: &SampleQuery,
        _geom: &SurfaceGeometry,
    ) -> Option<SampleBidirResult> {
        if !query.ty.intersects(BsdfType::EYE_DIRECTION) {
            return None;
        }

        let ndc = query.sample * 2.0 - Vec2::ONE;
        let dir_cam4 = self.inv_projection * Vec4::new(ndc.x, ndc.y, 0.0, 1.0);
        let dir_cam = (dir_cam4.truncate() / dir_cam4.w).normalize();
        let wo = self.inv_view.transform_vector3(dir_cam).normalize();

        let dir = query.transport_dir.index();
        let inv = query.transport_dir.opposite().index();
        let mut pdf = [PdfEval::default(); 2];
        let mut weight = [Color::ZERO; 2];
        pdf[dir] = PdfEval::projected_solid_angle(self.importance(-dir_cam.z));
        pdf[inv] = PdfEval::projected_solid_angle(0.0);
        // We^(1) matches the sampling density
        weight[dir] = Color::ONE;

        Some(SampleBidirResult {
            sampled_type: BsdfType::EYE_DIRECTION,
            wo,
            weight,
            pdf,
        })
    }

    fn evaluate_direction(&self, query: &EvaluateQuery, _geom: &SurfaceGeometry) -> Color {
        Color::splat(self.directional_importance(query.ty, query.wo))
    }

    fn evaluate_direction_pdf(&self, query: &EvaluateQuery, _geom: &SurfaceGeometry) -> PdfEval {
        PdfEval::projected_solid_angle(self.directional_importance(query.ty, query.wo))
    }

    fn degenerated(&self) -> bool {
        false
    }

    fn bsdf_types(&self) -> BsdfType {
        BsdfType::EYE_DIRECTION
    }
}

impl Emitter for PerspectiveCamera {
    fn sample_position(&self, _sample: Vec2) -> (SurfaceGeometry, PdfEval) {
        (SurfaceGeometry::degenerated_at(self.position), PdfEval::area(1.0))
    }

    fn evaluate_position(&self, _geom: &SurfaceGeometry) -> Color {
        Color::ONE
    }

    fn evaluate_position_pdf(&self, _geom: &SurfaceGeometry) -> PdfEval {
        PdfEval::area(1.0)
    }

    /// The camera node transform is camera-to-world.
    fn register_primitives(&mut self, primitives: &[&Primitive]) -> SceneResult<()> {
        let [primitive] = primitives else {
            return Err(SceneError::Registration(format!(
                "camera must be referenced by exactly one node, found {}",
                primitives.len()
            )));
        };
        self.set_view(primitive.transform.inverse());
        Ok(())
    }
}

impl Camera for PerspectiveCamera {
    fn ray_to_raster_position(&self, p: Vec3, d: Vec3) -> Option<Vec2> {
        let ref_cam = self.view.transform_point3(p + d);
        if ref_cam.z >= 0.0 {
            // Behind the pinhole
            return None;
        }
        let ref_ndc = self.projection.project_point3(ref_cam);
        let raster = (Vec2::new(ref_ndc.x, ref_ndc.y) + Vec2::ONE) * 0.5;
        // Directions sampled exactly on the sensor border must map back
        let tol = constants::EPS;
        if raster.x < -tol || raster.x > 1.0 + tol || raster.y < -tol || raster.y > 1.0 + tol {
            return None;
        }
        Some(raster.clamp(Vec2::ZERO, Vec2::ONE))
    }

    fn film(&self) -> &Film {
        &self.film
    }
}

/// Create a camera from its asset definition.
///
/// A `testing` element (`aspect`, `lookat`) replaces the film reference and
/// positions the camera without a scene node.
pub fn create(ty: &str, node: &ConfigNode<'_>, assets: &Assets) -> AssetResult<Box<dyn Camera>> {
    if ty != "perspective" {
        return Err(AssetError::UnknownType {
            kind: "camera",
            ty: ty.to_string(),
        });
    }

    let fovy: f32 = node.child_value("fovy")?;
    if let Some(testing) = node.child("testing") {
        log::warn!("Testing configuration is enabled");
        let aspect: f32 = testing.child_value("aspect")?;
        let lookat = testing.child("lookat").ok_or_else(|| AssetError::Invalid {
            kind: "camera",
            message: "missing 'lookat' element in testing configuration".to_string(),
        })?;
        let view = transform::look_at(
            lookat.child_value("position")?,
            lookat.child_value("center")?,
            lookat.child_value("up")?,
        );
        let film = match node.reference("film")? {
            Some(id) => assets.films.resolve(id)?.clone(),
            None => Film::new(1, 1),
        };
        let mut camera = PerspectiveCamera::new(fovy, aspect, film);
        camera.set_view(view);
        return Ok(Box::new(camera));
    }

    let film_id = node.reference("film")?.ok_or_else(|| AssetError::Invalid {
        kind: "camera",
        message: "missing 'film' reference".to_string(),
    })?;
    let film = assets.films.resolve(film_id)?.clone();
    let aspect = film.aspect();
    Ok(Box::new(PerspectiveCamera::new(fovy, aspect, film)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TransportDirection;

    fn sample_query(raster: Vec2) -> SampleQuery {
        SampleQuery {
            ty: BsdfType::EYE_DIRECTION,
            sample: raster,
            u_comp: 0.0,
            transport_dir: TransportDirection::EL,
            wi: Vec3::ZERO,
        }
    }

    #[test]
    fn test_sensor_area() {
        let camera = PerspectiveCamera::new(90.0, 1.0, Film::new(1, 1));
        assert!((camera.inv_a - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_raster_round_trip() {
        let camera = PerspectiveCamera::new(90.0, 2.0, Film::new(2, 1));
        let geom = SurfaceGeometry::degenerated_at(Vec3::ZERO);

        for (raster, expected) in [
            (Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, -1.0)),
            (Vec2::new(1.0, 1.0), Vec3::new(2.0, 1.0, -1.0).normalize()),
        ] {
            let sample = camera.sample_direction(&sample_query(raster), &geom).unwrap();
            assert!((sample.wo - expected).length() < 1e-4, "{:?}", sample.wo);

            let back = camera.ray_to_raster_position(Vec3::ZERO, sample.wo).unwrap();
            assert!((back - raster).length() < 1e-4, "{:?}", back);
        }
    }

    #[test]
    fn test_importance_matches_pdf() {
        let mut camera = PerspectiveCamera::new(45.0, 1.5, Film::new(3, 2));
        camera.set_view(transform::look_at(Vec3::new(2.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::Y));
        let geom = SurfaceGeometry::degenerated_at(camera.position());

        for raster in [Vec2::new(0.5, 0.5), Vec2::new(0.1, 0.8), Vec2::new(0.95, 0.05)] {
            let query = sample_query(raster);
            let (sample, weight) = camera.sample_and_estimate_direction(&query, &geom).unwrap();
            let eq = EvaluateQuery::from_sample(&query, &sample);
            let we = camera.evaluate_direction(&eq, &geom);
            let pdf = camera.evaluate_direction_pdf(&eq, &geom);
            assert!((pdf.v - sample.pdf.v).abs() < 1e-2 * sample.pdf.v);
            assert!((we / pdf.v - weight).length() < 1e-2);
        }
    }

    #[test]
    fn test_direction_outside_sensor() {
        let camera = PerspectiveCamera::new(90.0, 1.0, Film::new(1, 1));
        assert!(camera.ray_to_raster_position(Vec3::ZERO, Vec3::Z).is_none());
        assert!(camera
            .ray_to_raster_position(Vec3::ZERO, Vec3::new(3.0, 0.0, -1.0).normalize())
            .is_none());
        let eq = EvaluateQuery::new(BsdfType::ALL, TransportDirection::EL, Vec3::ZERO, Vec3::Z);
        assert_eq!(camera.evaluate_direction_pdf(&eq, &SurfaceGeometry::default()).v, 0.0);
    }

    #[test]
    fn test_register_uses_node_transform() {
        let mut camera = PerspectiveCamera::new(90.0, 1.0, Film::new(1, 1));
        let primitive = Primitive::with_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        camera.register_primitives(&[&primitive]).unwrap();
        assert!((camera.position() - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
        assert!(camera.register_primitives(&[]).is_err());
    }
}
