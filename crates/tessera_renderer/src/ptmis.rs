//! Path tracer combining light sampling and BSDF sampling with MIS.
//!
//! Both techniques are weighted by the balance heuristic with densities in
//! projected solid angle measure at the shading point. The camera is the
//! first vertex of the walk, so light points visible from the pinhole are
//! connected as well.

use tessera_core::{
    BsdfType, ConfigNode, Film, GeneralizedBsdf, SampleQuery, Sampler, Scene, TransportDirection,
};
use tessera_math::{ProbabilityMeasure, Ray, Vec2, Vec3};

use crate::initial_sampler::InitialSampler;
use crate::utils::{
    connect_to_light, emitted_radiance, generalized_geometry_term, light_position_pdf,
    russian_roulette, surface_bsdf,
};
use crate::{RenderError, RenderProcess, RenderResult, Renderer};

/// MIS path tracer (`ptmis`).
pub struct MisPathTraceRenderer {
    rr_depth: i32,
    max_path_vertices: i32,
    initial_sampler: Option<InitialSampler>,
}

impl Default for MisPathTraceRenderer {
    fn default() -> Self {
        Self {
            rr_depth: 1,
            max_path_vertices: -1,
            initial_sampler: None,
        }
    }
}

impl Renderer for MisPathTraceRenderer {
    fn type_name(&self) -> &'static str {
        "ptmis"
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
        Ok(Box::new(MisPathTraceProcess {
            renderer: self,
            scene,
            sampler: initial_sampler.create_sampler()?,
            film: scene.main_camera().film().clone_empty(),
        }))
    }
}

struct MisPathTraceProcess<'a> {
    renderer: &'a MisPathTraceRenderer,
    scene: &'a Scene,
    sampler: Box<dyn Sampler>,
    film: Film,
}

impl RenderProcess for MisPathTraceProcess<'_> {
    fn process_single_sample(&mut self) {
        let scene = self.scene;
        let renderer = self.renderer;
        let camera = scene.main_camera();
        let sampler = &mut *self.sampler;
        sampler.begin_sample();

        let (geom_e, pdf_pe) = camera.sample_position(sampler.next_vec2());
        let mut throughput = camera.evaluate_position(&geom_e) / pdf_pe.value_in(ProbabilityMeasure::Area);
        let mut curr_geom = geom_e;
        let mut curr_wi = Vec3::ZERO;
        let mut curr_bsdf: &dyn GeneralizedBsdf = camera.as_generalized_bsdf();
        let mut num_path_vertices = 1;
        let mut raster = Vec2::ZERO;

        loop {
            let can_connect =
                renderer.max_path_vertices == -1 || num_path_vertices < renderer.max_path_vertices;
            if can_connect && !curr_bsdf.degenerated() {
                if let Some(connection) = connect_to_light(scene, sampler, curr_bsdf, &curr_geom, curr_wi) {
                    let target = if num_path_vertices == 1 {
                        camera.ray_to_raster_position(curr_geom.p, connection.direction)
                    } else {
                        Some(raster)
                    };
                    if let Some(target) = target {
                        let w = connection.pdf_light / (connection.pdf_light + connection.pdf_bsdf);
                        self.film
                            .accumulate_contribution(target, throughput * connection.contrib * w);
                    }
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
                transport_dir: TransportDirection::EL,
                wi: curr_wi,
            };
            let Some((result, fs)) = curr_bsdf.sample_and_estimate_direction(&query, &curr_geom) else {
                break;
            };
            if tessera_math::is_zero(fs) {
                break;
            }
            throughput *= fs;

            if num_path_vertices == 1 {
                match camera.ray_to_raster_position(curr_geom.p, result.wo) {
                    Some(r) => raster = r,
                    None => break,
                }
            }

            let ray = Ray::spawn(curr_geom.p, result.wo);
            let Some(isect) = scene.intersect_with_emitter_shapes(&ray) else {
                break;
            };
            let primitive = scene.primitive(isect.primitive_index);

            if let Some(id) = primitive.light {
                let le = emitted_radiance(scene, primitive, &isect.geom, -ray.direction);
                let w = if result.sampled_type.intersects(BsdfType::SPECULAR) {
                    // Light sampling cannot produce a specular direction
                    1.0
                } else {
                    let g = generalized_geometry_term(&curr_geom, &isect.geom);
                    let pdf_light = if g == 0.0 {
                        0.0
                    } else {
                        light_position_pdf(scene, scene.light(id), &isect.geom) / g
                    };
                    let pdf_bsdf = result.pdf.value_in(ProbabilityMeasure::ProjectedSolidAngle);
                    pdf_bsdf / (pdf_bsdf + pdf_light)
                };
                self.film.accumulate_contribution(raster, throughput * le * w);
            }

            let Some(bsdf) = surface_bsdf(scene, primitive) else {
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
    use crate::testing;

    #[test]
    fn test_renders_room() {
        let output = testing::render_document(&testing::room_document(
            "white",
            r#"{
                "type": "ptmis", "num_samples": 2000, "num_threads": 2,
                "sampler": { "type": "random", "rng_seed": 1 }
            }"#,
        ));
        assert!(testing::is_valid_image(&output.film));
        assert!(testing::mean_luminance(&output.film) > 0.0);
    }

    #[test]
    fn test_mirror_floor_is_valid() {
        let output = testing::render_document(&testing::room_document(
            "mirror",
            r#"{
                "type": "ptmis", "num_samples": 2000, "num_threads": 2,
                "sampler": { "type": "random", "rng_seed": 2 }
            }"#,
        ));
        assert!(testing::is_valid_image(&output.film));
    }
}
