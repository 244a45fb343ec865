use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tessera_core::{
    BsdfType, ConfigNode, EvaluateQuery, Film, GeneralizedBsdf, SampleQuery, Sampler, Scene,
    TransportDirection,
};
use tessera_math::{Color, ProbabilityMeasure, Ray, Vec2, Vec3};

use super::kernel::DensityKernel;
use super::photon_map::{self, KdTreePhotonMap, Photon, PhotonMap};
use crate::initial_sampler::InitialSampler;
use crate::utils::{emitted_radiance, sample_light, surface_bsdf};
use crate::{ProgressCallback, RenderError, RenderOutput, RenderProcess, RenderResult, Renderer};

/// Photon mapper (`pm`).
pub struct PhotonMappingRenderer {
    num_photon_trace_samples: u64,
    max_photons: usize,
    max_photon_trace_depth: i32,
    num_nn_query_photons: usize,
    /// Squared query radius.
    max_nn_query_dist2: f32,
    photon_map: Box<dyn PhotonMap>,
    kernel: DensityKernel,
    initial_sampler: Option<InitialSampler>,
    visualize_photons: bool,
    traced_light_paths: u64,
}

impl Default for PhotonMappingRenderer {
    fn default() -> Self {
        Self {
            num_photon_trace_samples: 1,
            max_photons: 1,
            max_photon_trace_depth: -1,
            num_nn_query_photons: 50,
            max_nn_query_dist2: 0.01,
            photon_map: Box::new(KdTreePhotonMap::default()),
            kernel: DensityKernel::Simpson,
            initial_sampler: None,
            visualize_photons: false,
            traced_light_paths: 0,
        }
    }
}

impl PhotonMappingRenderer {
    /// Trace light paths until the sample budget or the photon budget runs out.
    fn trace_photons(&self, scene: &Scene, sampler: &mut dyn Sampler) -> (Vec<Photon>, u64) {
        let mut photons = Vec::with_capacity(self.max_photons.min(1 << 20));
        let mut traced = 0;

        while traced < self.num_photon_trace_samples && photons.len() < self.max_photons {
            traced += 1;
            sampler.begin_sample();
            let Some(sample) = sample_light(scene, sampler) else {
                break;
            };
            let mut throughput = sample.light.evaluate_position(&sample.geom)
                / sample.pdf.value_in(ProbabilityMeasure::Area);
            let mut curr_geom = sample.geom;
            let mut curr_wi = Vec3::ZERO;
            let mut curr_bsdf: &dyn GeneralizedBsdf = sample.light.as_generalized_bsdf();
            let mut depth = 0;

            loop {
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

                let next_throughput = throughput * fs;
                if depth >= 1 {
                    let continue_prob = (tessera_math::luminance(next_throughput)
                        / tessera_math::luminance(throughput))
                    .min(1.0);
                    if sampler.next() > continue_prob {
                        break;
                    }
                    throughput = next_throughput / continue_prob;
                } else {
                    throughput = next_throughput;
                }

                let ray = Ray::spawn(curr_geom.p, result.wo);
                let Some(isect) = scene.intersect(&ray) else {
                    break;
                };
                let Some(bsdf) = surface_bsdf(scene, scene.primitive(isect.primitive_index)) else {
                    break;
                };

                if !bsdf.bsdf_types().intersects(BsdfType::SPECULAR) {
                    photons.push(Photon {
                        p: isect.geom.p,
                        throughput,
                        wi: -ray.direction,
                    });
                    if photons.len() == self.max_photons {
                        break;
                    }
                }

                curr_geom = isect.geom;
                curr_wi = -ray.direction;
                curr_bsdf = bsdf;
                depth += 1;
                if self.max_photon_trace_depth != -1 && depth >= self.max_photon_trace_depth {
                    break;
                }
            }
        }

        (photons, traced)
    }
}

impl Renderer for PhotonMappingRenderer {
    fn type_name(&self) -> &'static str {
        "pm"
    }

    fn configure(&mut self, node: &ConfigNode<'_>, _scene: &Scene) -> RenderResult<()> {
        self.num_photon_trace_samples = node.child_value_or_default("num_photon_trace_samples", 1)?;
        self.max_photons = node.child_value_or_default("max_photons", 1)?;
        self.max_photon_trace_depth = node.child_value_or_default("max_photon_trace_depth", -1)?;
        self.num_nn_query_photons = node.child_value_or_default("num_nn_query_photons", 50)?;
        let max_nn_query_dist: f32 = node.child_value_or_default("max_nn_query_dist", 0.1)?;
        self.max_nn_query_dist2 = max_nn_query_dist * max_nn_query_dist;

        let map_type: String = node.child_value_or_default("photon_map_impl", "kdtree".to_string())?;
        self.photon_map = photon_map::create(&map_type)?;
        let kernel_type: String = node.child_value_or_default("pde_kernel", "simpson".to_string())?;
        self.kernel = DensityKernel::from_name(&kernel_type)?;

        self.initial_sampler = Some(InitialSampler::configure(node)?);

        self.visualize_photons = match node.child("experimental") {
            Some(experimental) => {
                log::warn!("Experimental mode is enabled");
                experimental.child_value_or_default("visualize_photons", false)?
            }
            None => false,
        };

        if self.num_nn_query_photons == 0 {
            return Err(RenderError::Invalid("'num_nn_query_photons' must be positive".to_string()));
        }
        Ok(())
    }

    fn preprocess(&mut self, scene: &Scene, progress: &ProgressCallback) -> RenderResult<()> {
        progress(0.0, false);
        let initial_sampler = self
            .initial_sampler
            .as_ref()
            .ok_or_else(|| RenderError::Preprocess("renderer is not configured".to_string()))?;
        let mut sampler = initial_sampler.create_sampler()?;

        let (photons, traced) = {
            log::info!("Tracing photons");
            let _indent = tessera_core::LogIndenter::new();
            let (photons, traced) = self.trace_photons(scene, &mut *sampler);
            log::info!("Traced {} light paths", traced);
            log::info!("Stored {} photons", photons.len());
            (photons, traced)
        };
        self.traced_light_paths = traced;

        log::info!("Building photon map");
        self.photon_map.build(photons);

        progress(1.0, true);
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
        Ok(Box::new(PhotonMappingProcess {
            renderer: self,
            scene,
            sampler: initial_sampler.create_sampler()?,
            film: scene.main_camera().film().clone_empty(),
            collected: BinaryHeap::with_capacity(self.num_nn_query_photons),
        }))
    }

    fn postprocess(&self, scene: &Scene, output: &mut RenderOutput) -> RenderResult<()> {
        if self.visualize_photons {
            log::info!("Visualizing photon map");
            let camera = scene.main_camera();
            let (geom_e, _) = camera.sample_position(Vec2::ZERO);
            for photon in self.photon_map.photons() {
                if let Some(raster) = camera.ray_to_raster_position(geom_e.p, (photon.p - geom_e.p).normalize()) {
                    output.film.record_contribution(raster, Color::new(1.0, 0.0, 0.0));
                }
            }
        }
        Ok(())
    }
}

/// Photon found by a nearest-neighbour query, ordered by distance.
struct NearPhoton<'a> {
    dist2: f32,
    photon: &'a Photon,
}

impl PartialEq for NearPhoton<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.dist2.total_cmp(&other.dist2) == Ordering::Equal
    }
}

impl Eq for NearPhoton<'_> {}

impl PartialOrd for NearPhoton<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NearPhoton<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist2.total_cmp(&other.dist2)
    }
}

struct PhotonMappingProcess<'a> {
    renderer: &'a PhotonMappingRenderer,
    scene: &'a Scene,
    sampler: Box<dyn Sampler>,
    film: Film,
    /// Max-heap of the current k nearest photons.
    collected: BinaryHeap<NearPhoton<'a>>,
}

impl<'a> PhotonMappingProcess<'a> {
    /// Radiance estimate at a non-specular surface point.
    fn estimate_radiance(&mut self, bsdf: &dyn GeneralizedBsdf, geom: &tessera_core::SurfaceGeometry, wi: Vec3) -> Color {
        let renderer: &'a PhotonMappingRenderer = self.renderer;
        let n = renderer.num_nn_query_photons;
        let collected = &mut self.collected;
        collected.clear();

        let p = geom.p;
        let mut max_dist2 = renderer.max_nn_query_dist2;
        renderer.photon_map.collect_photons(p, &mut max_dist2, &mut |photon, max_dist2| {
            let near = NearPhoton {
                dist2: photon.p.distance_squared(p),
                photon,
            };
            if collected.len() < n {
                collected.push(near);
                if collected.len() < n {
                    return;
                }
            } else if let Some(mut farthest) = collected.peek_mut() {
                *farthest = near;
            }
            if let Some(farthest) = collected.peek() {
                *max_dist2 = farthest.dist2;
            }
        });

        let mut l = Color::ZERO;
        for near in collected.iter() {
            let k = renderer.kernel.evaluate(p, near.photon, max_dist2);
            let density = k / (max_dist2 * renderer.traced_light_paths as f32);
            let query = EvaluateQuery::new(BsdfType::ALL_BSDF, TransportDirection::EL, wi, near.photon.wi);
            let fs = bsdf.evaluate_direction(&query, geom);
            l += density * fs * near.photon.throughput;
        }
        l
    }
}

impl RenderProcess for PhotonMappingProcess<'_> {
    fn process_single_sample(&mut self) {
        let scene = self.scene;
        let camera = scene.main_camera();
        self.sampler.begin_sample();

        let (geom_e, pdf_pe) = camera.sample_position(self.sampler.next_vec2());
        let mut throughput = camera.evaluate_position(&geom_e) / pdf_pe.value_in(ProbabilityMeasure::Area);
        let mut curr_geom = geom_e;
        let mut curr_wi = Vec3::ZERO;
        let mut curr_bsdf: &dyn GeneralizedBsdf = camera.as_generalized_bsdf();
        let mut at_camera = true;
        let mut raster = Vec2::ZERO;
        let mut l = Color::ZERO;

        loop {
            let query = SampleQuery {
                ty: BsdfType::ALL,
                sample: self.sampler.next_vec2(),
                u_comp: self.sampler.next(),
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

            if at_camera {
                match camera.ray_to_raster_position(curr_geom.p, result.wo) {
                    Some(r) => raster = r,
                    None => break,
                }
                at_camera = false;
            }

            let ray = Ray::spawn(curr_geom.p, result.wo);
            let Some(isect) = scene.intersect(&ray) else {
                break;
            };
            let primitive = scene.primitive(isect.primitive_index);
            // Emission reached through specular chains only
            l += throughput * emitted_radiance(scene, primitive, &isect.geom, -ray.direction);

            let Some(bsdf) = surface_bsdf(scene, primitive) else {
                break;
            };
            if !bsdf.bsdf_types().intersects(BsdfType::SPECULAR) {
                l += throughput * self.estimate_radiance(bsdf, &isect.geom, -ray.direction);
                break;
            }

            curr_geom = isect.geom;
            curr_wi = -ray.direction;
            curr_bsdf = bsdf;
        }

        if !tessera_math::is_zero(l) {
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
    use tessera_core::AcceleratorKind;

    use crate::testing;

    fn configured(renderer: &str) -> (PhotonMappingRenderer, Scene) {
        let document = testing::room_document("white", renderer);
        let (config, scene) = testing::load(&document, AcceleratorKind::Bvh);
        let mut pm = PhotonMappingRenderer::default();
        pm.configure(&config.renderer().unwrap(), &scene).unwrap();
        (pm, scene)
    }

    #[test]
    fn test_preprocess_respects_photon_budget() {
        let (mut pm, scene) = configured(
            r#"{
                "type": "pm", "num_photon_trace_samples": 100000, "max_photons": 200,
                "sampler": { "type": "random", "rng_seed": 1 }
            }"#,
        );
        pm.preprocess(&scene, &|_, _| {}).unwrap();
        assert_eq!(pm.photon_map.photons().len(), 200);
        assert!(pm.traced_light_paths >= 1 && pm.traced_light_paths <= 100000);
        for photon in pm.photon_map.photons() {
            assert!(photon.throughput.is_finite());
            assert!(photon.throughput.min_element() >= 0.0);
        }
    }

    #[test]
    fn test_max_trace_depth_limits_bounces() {
        let (mut pm, scene) = configured(
            r#"{
                "type": "pm", "num_photon_trace_samples": 500, "max_photons": 100000,
                "max_photon_trace_depth": 1,
                "sampler": { "type": "random", "rng_seed": 2 }
            }"#,
        );
        pm.preprocess(&scene, &|_, _| {}).unwrap();
        // One stored photon per traced path at most
        assert!(pm.photon_map.photons().len() as u64 <= pm.traced_light_paths);
    }

    #[test]
    fn test_renders_room() {
        for (map, kernel) in [("kdtree", "simpson"), ("naive", "cone"), ("kdtree", "gaussian")] {
            let output = testing::render_document(&testing::room_document(
                "white",
                &format!(
                    r#"{{
                        "type": "pm", "num_samples": 500, "num_threads": 2,
                        "num_photon_trace_samples": 5000, "max_photons": 20000,
                        "photon_map_impl": "{map}", "pde_kernel": "{kernel}",
                        "num_nn_query_photons": 20, "max_nn_query_dist": 0.05,
                        "sampler": {{ "type": "random", "rng_seed": 1 }}
                    }}"#
                ),
            ));
            assert!(testing::is_valid_image(&output.film));
            assert!(testing::mean_luminance(&output.film) > 0.0);
        }
    }

    #[test]
    fn test_rejects_unknown_options() {
        let document = testing::room_document(
            "white",
            r#"{ "type": "pm", "pde_kernel": "box", "sampler": { "type": "random" } }"#,
        );
        let (config, scene) = testing::load(&document, AcceleratorKind::Bvh);
        let mut pm = PhotonMappingRenderer::default();
        assert!(pm.configure(&config.renderer().unwrap(), &scene).is_err());
    }
}
