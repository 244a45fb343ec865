//! Unidirectional path tracer.
//!
//! Paths start at the camera and are extended by BSDF sampling only.
//! Emission is picked up when a path happens to hit a light.

use tessera_core::{
    BsdfType, Camera, ConfigNode, Film, SampleQuery, Sampler, Scene, TransportDirection,
};
use tessera_math::{Color, ProbabilityMeasure, Ray, Vec2, Vec3};

use crate::initial_sampler::InitialSampler;
use crate::utils::{emitted_radiance, russian_roulette, surface_bsdf};
use crate::{RenderError, RenderProcess, RenderResult, Renderer};

/// Camera ray through a random raster position.
pub(crate) struct CameraRay {
    pub raster: Vec2,
    pub ray: Ray,
    /// `We / pdf` of the sampled position and direction.
    pub throughput: Color,
}

/// Sample a raster position, a camera position and the primary ray.
pub(crate) fn sample_camera_ray(camera: &dyn Camera, sampler: &mut dyn Sampler) -> Option<CameraRay> {
    let raster = sampler.next_vec2();
    let (geom, pdf_p) = camera.sample_position(sampler.next_vec2());
    let query = SampleQuery {
        ty: BsdfType::EYE_DIRECTION,
        sample: raster,
        u_comp: 0.0,
        transport_dir: TransportDirection::EL,
        wi: Vec3::ZERO,
    };
    let (result, we_d) = camera.sample_and_estimate_direction(&query, &geom)?;
    let we_p = camera.evaluate_position(&geom) / pdf_p.value_in(ProbabilityMeasure::Area);
    Some(CameraRay {
        raster,
        ray: Ray::spawn(geom.p, result.wo),
        throughput: we_d * we_p,
    })
}

/// Path tracer (`pt`).
pub struct PathTraceRenderer {
    rr_depth: i32,
    max_path_vertices: i32,
    initial_sampler: Option<InitialSampler>,
}

impl Default for PathTraceRenderer {
    fn default() -> Self {
        Self {
            rr_depth: 1,
            max_path_vertices: -1,
            initial_sampler: None,
        }
    }
}

impl Renderer for PathTraceRenderer {
    fn type_name(&self) -> &'static str {
        "pt"
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
        Ok(Box::new(PathTraceProcess {
            renderer: self,
            scene,
            sampler: initial_sampler.create_sampler()?,
            film: scene.main_camera().film().clone_empty(),
        }))
    }
}

struct PathTraceProcess<'a> {
    renderer: &'a PathTraceRenderer,
    scene: &'a Scene,
    sampler: Box<dyn Sampler>,
    film: Film,
}

/// Trace one camera path and return its raster position and radiance.
///
/// `None` when no primary ray could be sampled.
pub(crate) fn trace_camera_path(
    scene: &Scene,
    sampler: &mut dyn Sampler,
    rr_depth: i32,
    max_path_vertices: i32,
) -> Option<(Vec2, Color)> {
    let CameraRay {
        raster,
        mut ray,
        mut throughput,
    } = sample_camera_ray(scene.main_camera(), sampler)?;

    let mut l = Color::ZERO;
    let mut num_path_vertices = 1;
    loop {
        let Some(isect) = scene.intersect_with_emitter_shapes(&ray) else {
            break;
        };
        let primitive = scene.primitive(isect.primitive_index);
        l += throughput * emitted_radiance(scene, primitive, &isect.geom, -ray.direction);

        let Some(bsdf) = surface_bsdf(scene, primitive) else {
            break;
        };
        let query = SampleQuery {
            ty: BsdfType::ALL_BSDF,
            sample: sampler.next_vec2(),
            u_comp: sampler.next(),
            transport_dir: TransportDirection::EL,
            wi: -ray.direction,
        };
        let Some((result, fs)) = bsdf.sample_and_estimate_direction(&query, &isect.geom) else {
            break;
        };
        if tessera_math::is_zero(fs) {
            break;
        }
        throughput *= fs;
        ray = Ray::spawn(isect.geom.p, result.wo);

        if rr_depth != -1 && num_path_vertices >= rr_depth {
            let Some(p) = russian_roulette(throughput, sampler) else {
                break;
            };
            throughput /= p;
        }

        num_path_vertices += 1;
        if max_path_vertices != -1 && num_path_vertices >= max_path_vertices {
            break;
        }
    }

    Some((raster, l))
}

impl RenderProcess for PathTraceProcess<'_> {
    fn process_single_sample(&mut self) {
        let renderer = self.renderer;
        self.sampler.begin_sample();
        if let Some((raster, l)) = trace_camera_path(
            self.scene,
            &mut *self.sampler,
            renderer.rr_depth,
            renderer.max_path_vertices,
        ) {
            self.film.accumulate_contribution(raster, l);
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
    fn test_camera_ray_maps_back_to_raster() {
        let scene = testing::two_quads_scene(AcceleratorKind::Bvh);
        let camera = scene.main_camera();
        let mut sampler = RandomSampler::new(2);
        for _ in 0..50 {
            let sample = sample_camera_ray(camera, &mut sampler).unwrap();
            let raster = camera
                .ray_to_raster_position(sample.ray.origin, sample.ray.direction)
                .unwrap();
            assert!((raster - sample.raster).length() < 1e-3);
            assert!((sample.throughput - Color::ONE).length() < 1e-4);
        }
    }

    #[test]
    fn test_two_vertex_paths_miss_hidden_light() {
        // Two vertex paths only see emission along the camera ray
        let output = testing::render_document(&testing::room_document(
            "white",
            r#"{
                "type": "pt", "num_samples": 4000, "num_threads": 2, "max_path_vertices": 2,
                "sampler": { "type": "random", "rng_seed": 3 }
            }"#,
        ));
        assert!(testing::is_valid_image(&output.film));
        // The light is outside the field of view
        assert_eq!(testing::mean_luminance(&output.film), 0.0);
    }

    #[test]
    fn test_renders_room() {
        let output = testing::render_document(&testing::room_document(
            "white",
            r#"{
                "type": "pt", "num_samples": 4000, "num_threads": 2,
                "sampler": { "type": "random", "rng_seed": 1 }
            }"#,
        ));
        assert_eq!(output.processed_samples, 4000);
        assert!(testing::is_valid_image(&output.film));
        assert!(testing::mean_luminance(&output.film) > 0.0);
    }
}
