//! Path tracer with next event estimation.
//!
//! Every non-specular vertex is connected to a sampled light point. Since
//! those connections already account for direct light, emission found by
//! BSDF sampling is only counted on the camera ray and after specular
//! bounces, where no connection could have been made.

use tessera_core::{BsdfType, ConfigNode, Film, SampleQuery, Sampler, Scene, TransportDirection};
use tessera_math::{Color, Ray};

use crate::initial_sampler::InitialSampler;
use crate::pt::{sample_camera_ray, CameraRay};
use crate::utils::{connect_to_light, emitted_radiance, russian_roulette, surface_bsdf};
use crate::{RenderError, RenderProcess, RenderResult, Renderer};

/// Direct-lighting path tracer (`ptdirect`).
pub struct DirectPathTraceRenderer {
    rr_depth: i32,
    max_path_vertices: i32,
    initial_sampler: Option<InitialSampler>,
}

impl Default for DirectPathTraceRenderer {
    fn default() -> Self {
        Self {
            rr_depth: 1,
            max_path_vertices: -1,
            initial_sampler: None,
        }
    }
}

impl Renderer for DirectPathTraceRenderer {
    fn type_name(&self) -> &'static str {
        "ptdirect"
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
        Ok(Box::new(DirectPathTraceProcess {
            renderer: self,
            scene,
            sampler: initial_sampler.create_sampler()?,
            film: scene.main_camera().film().clone_empty(),
        }))
    }
}

struct DirectPathTraceProcess<'a> {
    renderer: &'a DirectPathTraceRenderer,
    scene: &'a Scene,
    sampler: Box<dyn Sampler>,
    film: Film,
}

impl RenderProcess for DirectPathTraceProcess<'_> {
    fn process_single_sample(&mut self) {
        let scene = self.scene;
        let renderer = self.renderer;
        let sampler = &mut *self.sampler;
        sampler.begin_sample();
        let Some(CameraRay {
            raster,
            mut ray,
            mut throughput,
        }) = sample_camera_ray(scene.main_camera(), sampler)
        else {
            return;
        };

        let mut l = Color::ZERO;
        let mut num_path_vertices = 1;
        // The camera ray cannot be produced by a light connection
        let mut implicit_emission = true;
        loop {
            let Some(isect) = scene.intersect_with_emitter_shapes(&ray) else {
                break;
            };
            let primitive = scene.primitive(isect.primitive_index);
            num_path_vertices += 1;
            if implicit_emission {
                l += throughput * emitted_radiance(scene, primitive, &isect.geom, -ray.direction);
            }

            let Some(bsdf) = surface_bsdf(scene, primitive) else {
                break;
            };
            if renderer.max_path_vertices != -1 && num_path_vertices >= renderer.max_path_vertices {
                break;
            }

            let wi = -ray.direction;
            if !bsdf.degenerated() {
                if let Some(connection) = connect_to_light(scene, sampler, bsdf, &isect.geom, wi) {
                    l += throughput * connection.contrib;
                }
            }

            let query = SampleQuery {
                ty: BsdfType::ALL_BSDF,
                sample: sampler.next_vec2(),
                u_comp: sampler.next(),
                transport_dir: TransportDirection::EL,
                wi,
            };
            let Some((result, fs)) = bsdf.sample_and_estimate_direction(&query, &isect.geom) else {
                break;
            };
            if tessera_math::is_zero(fs) {
                break;
            }
            implicit_emission = result.sampled_type.intersects(BsdfType::SPECULAR);
            throughput *= fs;
            ray = Ray::spawn(isect.geom.p, result.wo);

            if renderer.rr_depth != -1 && num_path_vertices >= renderer.rr_depth {
                let Some(p) = russian_roulette(throughput, sampler) else {
                    break;
                };
                throughput /= p;
            }
        }

        self.film.accumulate_contribution(raster, l);
    }

    fn film(&self) -> &Film {
        &self.film
    }
}
