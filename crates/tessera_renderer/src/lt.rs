//! Light tracer.
//!
//! Particles are emitted from the lights and every non-specular vertex is
//! connected to the camera. Contributions land wherever the connection
//! crosses the sensor rather than at a preselected raster position.

use tessera_core::{
    BsdfType, Camera, ConfigNode, EvaluateQuery, Film, GeneralizedBsdf, SampleQuery, Sampler, Scene,
    SurfaceGeometry, TransportDirection,
};
use tessera_math::{Color, ProbabilityMeasure, Ray, Vec2, Vec3};

use crate::initial_sampler::InitialSampler;
use crate::utils::{generalized_geometry_term, russian_roulette, sample_light, surface_bsdf};
use crate::{RenderError, RenderProcess, RenderResult, Renderer};

/// Light tracer (`lt`).
pub struct LightTraceRenderer {
    rr_depth: i32,
    max_path_vertices: i32,
    initial_sampler: Option<InitialSampler>,
}

impl Default for LightTraceRenderer {
    fn default() -> Self {
        Self {
            rr_depth: 1,
            max_path_vertices: -1,
            initial_sampler: None,
        }
    }
}

impl Renderer for LightTraceRenderer {
    fn type_name(&self) -> &'static str {
        "lt"
    }

    fn configure(&mut self, node: &ConfigNode<'_>, _scene: &Scene) -> RenderResult<()> {
        self.rr_depth = node.child_value_or_default("rr_depth", 1)?;
        self.max_path_vertices = node.child_value_or_default("max_path_vertices", -1)?;
        self.initial_sampler = Some(InitialSampler::configure(node)?);
        Ok(())
    }

    fn create_render_process<'a>(
        &'a self,
        scene: &'a Scene,
        _thread_id: usize,
        _num_threads: usize,
    ) -> RenderResult<Box<dyn RenderProcess + 'a>> {
        let initial_sampler = self
            .initial_sampler
            .as_ref()
            .ok_or_else(|| RenderError::Process("renderer is not configured".to_string()))?;
        Ok(Box::new(LightTraceProcess {
            renderer: self,
            scene,
            sampler: initial_sampler.create_sampler()?,
            film: scene.main_camera().film().clone_empty(),
        }))
    }
}

/// Connect a light subpath vertex to a sampled camera point.
///
/// Returns the raster position and `fs * G * We / pdf` of the connection.
fn connect_to_camera(
    scene: &Scene,
    camera: &dyn Camera,
    sampler: &mut dyn Sampler,
    bsdf: &dyn GeneralizedBsdf,
    geom: &SurfaceGeometry,
    wi: Vec3,
) -> Option<(Vec2, Color)> {
    let (geom_e, pdf_pe) = camera.sample_position(sampler.next_vec2());
    if !scene.visible(geom.p, geom_e.p) {
        return None;
    }
    let pp_e = (geom_e.p - geom.p).normalize();
    let raster = camera.ray_to_raster_position(geom_e.p, -pp_e)?;

    let fs_l = bsdf.evaluate_direction(
        &EvaluateQuery::new(BsdfType::ALL, TransportDirection::LE, wi, pp_e),
        geom,
    );
    let fs_e = camera.evaluate_direction(
        &EvaluateQuery::new(BsdfType::EYE_DIRECTION, TransportDirection::EL, Vec3::ZERO, -pp_e),
        &geom_e,
    );
    let g = generalized_geometry_term(geom, &geom_e);
    let we_p = camera.evaluate_position(&geom_e);
    Some((raster, fs_l * g * fs_e * we_p / pdf_pe.value_in(ProbabilityMeasure::Area)))
}

struct LightTraceProcess<'a> {
    renderer: &'a LightTraceRenderer,
    scene: &'a Scene,
    sampler: Box<dyn Sampler>,
    film: Film,
}

impl RenderProcess for LightTraceProcess<'_> {
    fn process_single_sample(&mut self) {
        let scene = self.scene;
        let renderer = self.renderer;
        let camera = scene.main_camera();
        let sampler = &mut *self.sampler;
        sampler.begin_sample();

        let Some(sample) = sample_light(scene, sampler) else {
            return;
        };
        let mut throughput =
            sample.light.evaluate_position(&sample.geom) / sample.pdf.value_in(ProbabilityMeasure::Area);
        let mut curr_geom = sample.geom;
        let mut curr_wi = Vec3::ZERO;
        let mut curr_bsdf: &dyn GeneralizedBsdf = sample.light.as_generalized_bsdf();
        let mut num_path_vertices = 1;

        loop {
            let can_connect =
                renderer.max_path_vertices == -1 || num_path_vertices < renderer.max_path_vertices;
            if can_connect && !curr_bsdf.degenerated() {
                if let Some((raster, contrib)) =
                    connect_to_camera(scene, camera, sampler, curr_bsdf, &curr_geom, curr_wi)
                {
                    self.film.accumulate_contribution(raster, throughput * contrib);
                }
            }

            if renderer.rr_depth != -1 && num_path_vertices >= renderer.rr_depth {
                let Some(p) = russian_roulette(throughput, sampler) else {
                    break;
                };
                throughput /= p;
            }

            let query = SampleQuery {
                ty: BsdfType::ALL,
                sample: sampler.next_vec2(),
                u_comp: sampler.next(),
                transport_dir: TransportDirection::LE,
                wi: curr_wi,
            };
            let Some((result, fs)) = curr_bsdf.sample_and_estimate_direction(&query, &curr_geom) else {
                break;
            };
            if tessera_math::is_zero(fs) {
                break;
            }
            throughput *= fs;

            let ray = Ray::spawn(curr_geom.p, result.wo);
            let Some(isect) = scene.intersect(&ray) else {
                break;
            };
            let Some(bsdf) = surface_bsdf(scene, scene.primitive(isect.primitive_index)) else {
                break;
            };
            curr_geom = isect.geom;
            curr_wi = -ray.direction;
            curr_bsdf = bsdf;
            num_path_vertices += 1;
            if renderer.max_path_vertices != -1 && num_path_vertices >= renderer.max_path_vertices {
                break;
            }
        }
    }

    fn film(&self) -> &Film {
        &self.film
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{AcceleratorKind, RandomSampler};

    use crate::testing;

    #[test]
    fn test_connection_lands_on_sensor() {
        let scene = testing::two_quads_scene(AcceleratorKind::Bvh);
        let camera = scene.main_camera();
        let bsdf = scene
            .generalized_bsdf(scene.primitive(1))
            .expect("upper quad has a bsdf");
        let mut sampler = RandomSampler::new(8);

        // Upper quad center seen from the camera straight above it
        let geom = SurfaceGeometry::with_normal(Vec3::new(0.5, 0.5, 0.0), Vec3::Z);
        let (raster, contrib) =
            connect_to_camera(&scene, camera, &mut sampler, bsdf, &geom, Vec3::Z).unwrap();
        assert!((raster - Vec2::splat(0.5)).length() < 1e-3);
        assert!(contrib.x > 0.0);

        // Below the upper quad the camera is occluded
        let below = SurfaceGeometry::with_normal(Vec3::new(0.5, 0.5, -0.5), Vec3::Z);
        assert!(connect_to_camera(&scene, camera, &mut sampler, bsdf, &below, Vec3::Z).is_none());
    }

    #[test]
    fn test_renders_room() {
        let output = testing::render_document(&testing::room_document(
            "white",
            r#"{
                "type": "lt", "num_samples": 4000, "num_threads": 2,
                "sampler": { "type": "random", "rng_seed": 1 }
            }"#,
        ));
        assert!(testing::is_valid_image(&output.film));
        assert!(testing::mean_luminance(&output.film) > 0.0);
    }
}
