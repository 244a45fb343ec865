use tessera_core::{ConfigNode, Sampler, Scene, TransportDirection};

use super::splat::{Splat, Splats};
use crate::bpt::{evaluate_strategies, MisWeight, PathVertexPool, Subpath};
use crate::pt::trace_camera_path;
use crate::{RenderError, RenderResult};

/// Maps a stream of primary samples to path contributions.
pub trait PathSampler<'a>: Send {
    /// Replace `splats` with the contributions of one path sample.
    fn sample_and_evaluate(
        &mut self,
        scene: &'a Scene,
        sampler: &mut dyn Sampler,
        splats: &mut Splats,
        rr_depth: i32,
        max_path_vertices: i32,
    );
}

/// The `path_sampler` element, resolved to a concrete kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSamplerKind {
    Pt,
    Bpt(MisWeight),
}

impl PathSamplerKind {
    /// Read `path_sampler { type: "pt" | "bpt", mis_weight }`.
    pub fn configure(node: &ConfigNode<'_>) -> RenderResult<Self> {
        let sampler_node = node
            .child("path_sampler")
            .ok_or_else(|| RenderError::Invalid("missing 'path_sampler' element".to_string()))?;
        match sampler_node.required_attribute("type")? {
            "pt" => Ok(PathSamplerKind::Pt),
            "bpt" => Ok(PathSamplerKind::Bpt(MisWeight::configure(&sampler_node)?)),
            other => {
                log::error!("Unsupported path sampler '{}'", other);
                Err(RenderError::Invalid(format!("unknown path sampler '{}'", other)))
            }
        }
    }

    pub fn create<'a>(&self) -> Box<dyn PathSampler<'a> + 'a> {
        match *self {
            PathSamplerKind::Pt => Box::new(PtPathSampler),
            PathSamplerKind::Bpt(mis) => Box::new(BptPathSampler::new(mis)),
        }
    }
}

/// Unidirectional path tracing; one splat per sample.
pub struct PtPathSampler;

impl<'a> PathSampler<'a> for PtPathSampler {
    fn sample_and_evaluate(
        &mut self,
        scene: &'a Scene,
        sampler: &mut dyn Sampler,
        splats: &mut Splats,
        rr_depth: i32,
        max_path_vertices: i32,
    ) {
        splats.clear();
        if let Some((raster, l)) = trace_camera_path(scene, sampler, rr_depth, max_path_vertices) {
            splats.push(Splat { s: 0, t: 0, raster, l });
        }
    }
}

/// Bidirectional path tracing; one splat per contributing strategy.
///
/// The light and eye subpaths may be drawn from separate samplers so that
/// each subpath owns its own part of primary sample space.
pub struct BptPathSampler<'a> {
    mis: MisWeight,
    pool: PathVertexPool<'a>,
    light: Subpath,
    eye: Subpath,
}

impl<'a> BptPathSampler<'a> {
    pub fn new(mis: MisWeight) -> Self {
        Self {
            mis,
            pool: PathVertexPool::new(),
            light: Subpath::new(TransportDirection::LE),
            eye: Subpath::new(TransportDirection::EL),
        }
    }

    /// Start a new sample, dropping both subpaths.
    pub fn release(&mut self) {
        self.pool.release();
        self.light.clear();
        self.eye.clear();
    }

    pub fn sample_light_subpath(
        &mut self,
        scene: &'a Scene,
        sampler: &mut dyn Sampler,
        rr_depth: i32,
        max_path_vertices: i32,
    ) {
        self.light.sample(scene, sampler, &mut self.pool, rr_depth, max_path_vertices);
    }

    pub fn sample_eye_subpath(
        &mut self,
        scene: &'a Scene,
        sampler: &mut dyn Sampler,
        rr_depth: i32,
        max_path_vertices: i32,
    ) {
        self.eye.sample(scene, sampler, &mut self.pool, rr_depth, max_path_vertices);
    }

    /// Connect the current subpaths into `splats`.
    pub fn evaluate(&self, scene: &Scene, splats: &mut Splats, max_path_vertices: i32) {
        splats.clear();
        evaluate_strategies(
            scene,
            &self.pool,
            &self.light,
            &self.eye,
            &self.mis,
            max_path_vertices,
            |path, contrib, raster, weight| {
                splats.push(Splat {
                    s: path.s,
                    t: path.t,
                    raster,
                    l: contrib * weight,
                });
            },
        );
    }

    /// Sample the light subpath from `light_sampler`, the eye subpath from
    /// `eye_sampler` and evaluate every strategy.
    pub fn sample_and_evaluate_bidir(
        &mut self,
        scene: &'a Scene,
        light_sampler: &mut dyn Sampler,
        eye_sampler: &mut dyn Sampler,
        splats: &mut Splats,
        rr_depth: i32,
        max_path_vertices: i32,
    ) {
        self.release();
        self.sample_light_subpath(scene, light_sampler, rr_depth, max_path_vertices);
        self.sample_eye_subpath(scene, eye_sampler, rr_depth, max_path_vertices);
        self.evaluate(scene, splats, max_path_vertices);
    }
}

impl<'a> PathSampler<'a> for BptPathSampler<'a> {
    fn sample_and_evaluate(
        &mut self,
        scene: &'a Scene,
        sampler: &mut dyn Sampler,
        splats: &mut Splats,
        rr_depth: i32,
        max_path_vertices: i32,
    ) {
        self.release();
        self.sample_light_subpath(scene, sampler, rr_depth, max_path_vertices);
        self.sample_eye_subpath(scene, sampler, rr_depth, max_path_vertices);
        self.evaluate(scene, splats, max_path_vertices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{AcceleratorKind, RewindableSampler};

    use crate::testing;

    #[test]
    fn test_configure_kinds() {
        let value = serde_json::json!({ "path_sampler": { "type": "pt" } });
        let node = ConfigNode::new("renderer", &value);
        assert_eq!(PathSamplerKind::configure(&node).unwrap(), PathSamplerKind::Pt);

        let value = serde_json::json!({ "path_sampler": { "type": "bpt", "mis_weight": { "type": "simple" } } });
        let node = ConfigNode::new("renderer", &value);
        assert_eq!(
            PathSamplerKind::configure(&node).unwrap(),
            PathSamplerKind::Bpt(MisWeight::Simple)
        );

        // BPT needs its MIS weight
        let value = serde_json::json!({ "path_sampler": { "type": "bpt" } });
        let node = ConfigNode::new("renderer", &value);
        assert!(PathSamplerKind::configure(&node).is_err());

        let value = serde_json::json!({});
        let node = ConfigNode::new("renderer", &value);
        assert!(PathSamplerKind::configure(&node).is_err());
    }

    #[test]
    fn test_same_stream_same_splats() {
        let document = testing::room_document("white", r#"{ "type": "pssmlt" }"#);
        let (_, scene) = testing::load(&document, AcceleratorKind::Bvh);

        for kind in [PathSamplerKind::Pt, PathSamplerKind::Bpt(MisWeight::Power { beta: 2.0 })] {
            let mut path_sampler = kind.create();
            let mut sampler = RewindableSampler::new(5);
            let mut first = Splats::default();
            let mut second = Splats::default();
            for _ in 0..20 {
                let index = sampler.sample_index();
                path_sampler.sample_and_evaluate(&scene, &mut sampler, &mut first, 3, -1);
                sampler.rewind(index);
                path_sampler.sample_and_evaluate(&scene, &mut sampler, &mut second, 3, -1);
                assert_eq!(first.splats, second.splats);
            }
        }
    }

    #[test]
    fn test_shared_stream_matches_bidir_with_one_sampler() {
        let document = testing::room_document("white", r#"{ "type": "pssmlt" }"#);
        let (_, scene) = testing::load(&document, AcceleratorKind::Bvh);
        let mis = MisWeight::Power { beta: 2.0 };
        let mut a = BptPathSampler::new(mis);
        let mut b = BptPathSampler::new(mis);
        let mut splats_a = Splats::default();
        let mut splats_b = Splats::default();

        let mut sampler_a = RewindableSampler::new(11);
        let mut sampler_b = RewindableSampler::new(11);
        for _ in 0..20 {
            a.sample_and_evaluate(&scene, &mut sampler_a, &mut splats_a, 3, -1);
            // Light then eye subpath from one stream, sampled in two steps
            b.release();
            b.sample_light_subpath(&scene, &mut sampler_b, 3, -1);
            b.sample_eye_subpath(&scene, &mut sampler_b, 3, -1);
            b.evaluate(&scene, &mut splats_b, -1);
            assert_eq!(splats_a.splats, splats_b.splats);
        }
    }
}
