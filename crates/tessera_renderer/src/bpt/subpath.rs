use tessera_core::{BsdfType, SampleQuery, Sampler, Scene, TransportDirection};
use tessera_math::{
    luminance, Color, PdfEval, ProbabilityMeasure, Ray, Vec2, Vec3,
};

use super::vertex::{PathVertex, PathVertexPool, VertexType};

/// Light or eye subpath; vertices live in a [`PathVertexPool`].
#[derive(Debug, Clone)]
pub struct Subpath {
    pub transport_dir: TransportDirection,
    pub vertices: Vec<usize>,
}

impl Subpath {
    pub fn new(transport_dir: TransportDirection) -> Self {
        Self {
            transport_dir,
            vertices: Vec::new(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex<'p, 'a>(&self, pool: &'p PathVertexPool<'a>, i: usize) -> &'p PathVertex<'a> {
        pool.get(self.vertices[i])
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Sample a subpath starting at the main camera (`EL`) or at a light
    /// (`LE`).
    ///
    /// `rr_depth` is the vertex count from which Russian roulette applies
    /// and `max_path_vertices` caps the length; `-1` disables either.
    pub fn sample<'a>(
        &mut self,
        scene: &'a Scene,
        sampler: &mut dyn Sampler,
        pool: &mut PathVertexPool<'a>,
        rr_depth: i32,
        max_path_vertices: i32,
    ) {
        self.vertices.clear();
        let dir = self.transport_dir;
        let d = dir.index();
        let inv = dir.opposite().index();

        let mut v = PathVertex {
            ty: VertexType::EndPoint,
            transport_dir: dir,
            ..Default::default()
        };
        match dir {
            TransportDirection::EL => {
                let camera = scene.main_camera();
                let (geom, pdf_p) = camera.sample_position(sampler.next_vec2());
                v.geom = geom;
                v.pdf_p = pdf_p;
                v.emitter = Some(camera.as_emitter());
                if !geom.degenerated {
                    v.area_camera = Some(camera);
                }
            }
            TransportDirection::LE => {
                let Some((id, u, selection_pdf)) = scene.sample_light_selection(sampler.next()) else {
                    return;
                };
                let light = scene.light(id);
                let (geom, pdf_p) = light.sample_position(Vec2::new(u, sampler.next()));
                v.geom = geom;
                v.pdf_p = pdf_p.scaled(selection_pdf.v);
                v.emitter = Some(light.as_emitter());
                v.area_light = Some(light);
            }
        }
        let emitter = v.emitter.map(|e| e.as_generalized_bsdf());
        v.bsdf = emitter;

        let query = SampleQuery {
            ty: BsdfType::ALL_EMITTER,
            sample: sampler.next_vec2(),
            u_comp: sampler.next(),
            transport_dir: dir,
            wi: Vec3::ZERO,
        };
        let Some(result) = emitter.and_then(|e| e.sample_and_estimate_direction_bidir(&query, &v.geom)) else {
            self.vertices.push(pool.push(v));
            return;
        };
        v.wo = result.wo;
        v.weight = result.weight;
        v.pdf_d[d] = result.pdf[d];
        v.pdf_d[inv] = PdfEval::zero(ProbabilityMeasure::ProjectedSolidAngle);
        let mut throughput = result.weight[d];
        self.vertices.push(pool.push(v));

        let mut depth = 1;
        loop {
            let prev = *pool.get(self.vertices[self.vertices.len() - 1]);
            let ray = Ray::spawn(prev.geom.p, prev.wo);
            let Some(isect) = scene.intersect_with_emitter_shapes(&ray) else {
                break;
            };

            let primitive = scene.primitive(isect.primitive_index);
            let mut v = PathVertex {
                ty: VertexType::Intermediate,
                transport_dir: dir,
                geom: isect.geom,
                wi: -ray.direction,
                bsdf: scene.generalized_bsdf(primitive),
                ..Default::default()
            };
            if let Some(id) = primitive.light {
                let light = scene.light(id);
                v.area_light = Some(light);
                v.emitter = Some(light.as_emitter());
                v.pdf_p = light
                    .evaluate_position_pdf(&v.geom)
                    .scaled(scene.light_selection_pdf().v);
            }
            if let Some(id) = primitive.camera {
                let camera = scene.camera(id);
                v.area_camera = Some(camera);
                v.emitter = Some(camera.as_emitter());
                v.pdf_p = camera.evaluate_position_pdf(&v.geom);
            }

            depth += 1;
            if max_path_vertices != -1 && depth >= max_path_vertices {
                self.vertices.push(pool.push(v));
                break;
            }

            if rr_depth != -1 && depth >= rr_depth {
                let p = luminance(throughput).min(0.5);
                if sampler.next() > p {
                    self.vertices.push(pool.push(v));
                    break;
                }
                v.pdf_rr = PdfEval::discrete(p);
            }

            // Emitter-only surfaces absorb
            let bsdf = match (primitive.bsdf, v.bsdf) {
                (Some(_), Some(bsdf)) => bsdf,
                _ => {
                    self.vertices.push(pool.push(v));
                    break;
                }
            };

            let query = SampleQuery {
                ty: BsdfType::ALL,
                sample: sampler.next_vec2(),
                u_comp: sampler.next(),
                transport_dir: dir,
                wi: v.wi,
            };
            let result = match bsdf.sample_and_estimate_direction_bidir(&query, &v.geom) {
                Some(result) if !tessera_math::is_zero(result.weight[d]) => result,
                _ => {
                    self.vertices.push(pool.push(v));
                    break;
                }
            };

            v.wo = result.wo;
            v.weight = result.weight;
            v.pdf_d[d] = result.pdf[d];
            v.pdf_d[inv] = if prev.geom.degenerated {
                PdfEval::zero(ProbabilityMeasure::ProjectedSolidAngle)
            } else {
                result.pdf[inv]
            };
            throughput *= result.weight[d] / v.pdf_rr.value_in(ProbabilityMeasure::Discrete);
            self.vertices.push(pool.push(v));
        }
    }

    /// Subpath weight `alpha` of the first `vs` vertices.
    ///
    /// For an eye subpath the raster position of the primary ray is
    /// returned as well; a primary ray outside the sensor yields zero.
    pub fn evaluate_subpath_alpha(
        &self,
        scene: &Scene,
        pool: &PathVertexPool<'_>,
        vs: usize,
    ) -> (Color, Option<Vec2>) {
        if vs == 0 {
            return (Color::ONE, None);
        }

        let v0 = self.vertex(pool, 0);
        let mut raster = None;
        if self.transport_dir == TransportDirection::EL {
            match scene.main_camera().ray_to_raster_position(v0.geom.p, v0.wo) {
                Some(r) => raster = Some(r),
                None => return (Color::ZERO, None),
            }
        }
        let Some(emitter) = v0.emitter else {
            return (Color::ZERO, raster);
        };

        let d = self.transport_dir.index();
        let mut alpha = emitter.evaluate_position(&v0.geom) / v0.pdf_p.value_in(ProbabilityMeasure::Area);
        for i in 0..vs - 1 {
            let v = self.vertex(pool, i);
            alpha *= v.weight[d] / v.pdf_rr.value_in(ProbabilityMeasure::Discrete);
        }
        (alpha, raster)
    }
}
