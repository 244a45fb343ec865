use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tessera_core::{ConfigNode, Film, FilmError, Sampler, Scene, TransportDirection};
use tessera_math::{Color, Vec2};

use super::fullpath::FullPath;
use super::mis::MisWeight;
use super::subpath::Subpath;
use super::vertex::PathVertexPool;
use crate::initial_sampler::InitialSampler;
use crate::{RenderError, RenderOutput, RenderProcess, RenderResult, Renderer};

/// Connect every pair of subpath prefixes and report the non-zero ones.
///
/// `f` receives the full path, its unweighted contribution `C*`, the
/// raster position and the MIS weight.
pub fn evaluate_strategies<F>(
    scene: &Scene,
    pool: &PathVertexPool<'_>,
    light: &Subpath,
    eye: &Subpath,
    mis: &MisWeight,
    max_path_vertices: i32,
    mut f: F,
) where
    F: FnMut(&FullPath<'_, '_>, Color, Vec2, f32),
{
    let n_l = light.num_vertices();
    let n_e = eye.num_vertices();
    for n in 2..=n_l + n_e {
        if max_path_vertices != -1 && n > max_path_vertices as usize {
            break;
        }
        for s in n.saturating_sub(n_e)..=n_l.min(n) {
            let path = FullPath::new(s, n - s, pool, light, eye);
            let Some((contrib, raster)) = path.evaluate_unweight_contribution(scene) else {
                continue;
            };
            let weight = mis.evaluate(&path);
            f(&path, contrib, raster, weight);
        }
    }
}

/// Per-strategy and per-length images, written after rendering.
struct StrategyImages {
    max_subpath_num_vertices: usize,
    dir: PathBuf,
    template: Film,
    strategies: Mutex<BTreeMap<(usize, usize), Film>>,
    lengths: Mutex<BTreeMap<usize, Film>>,
}

impl StrategyImages {
    fn record(&self, s: usize, t: usize, raster: Vec2, contrib: Color, weight: f32) {
        if s <= self.max_subpath_num_vertices && t <= self.max_subpath_num_vertices {
            let mut strategies = self.strategies.lock().unwrap_or_else(PoisonError::into_inner);
            strategies
                .entry((s, t))
                .or_insert_with(|| self.template.clone_empty())
                .accumulate_contribution(raster, contrib);
        }
        let mut lengths = self.lengths.lock().unwrap_or_else(PoisonError::into_inner);
        lengths
            .entry(s + t)
            .or_insert_with(|| self.template.clone_empty())
            .accumulate_contribution(raster, contrib * weight);
    }

    fn save(&self, processed_samples: u64) -> RenderResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(FilmError::from)?;
        let scale = if processed_samples > 0 {
            (self.template.width() * self.template.height()) as f32 / processed_samples as f32
        } else {
            0.0
        };

        let strategies = self.strategies.lock().unwrap_or_else(PoisonError::into_inner);
        for (&(s, t), film) in strategies.iter() {
            let mut film = film.clone();
            film.rescale(scale);
            film.save(self.dir.join(format!("s{:02}t{:02}.hdr", s, t)))?;
        }
        let lengths = self.lengths.lock().unwrap_or_else(PoisonError::into_inner);
        for (&n, film) in lengths.iter() {
            let mut film = film.clone();
            film.rescale(scale);
            film.save(self.dir.join(format!("l{:03}.hdr", n)))?;
        }
        Ok(())
    }
}

/// Bidirectional path tracer (`bpt`).
pub struct BptRenderer {
    rr_depth: i32,
    max_path_vertices: i32,
    mis: MisWeight,
    initial_sampler: Option<InitialSampler>,
    images: Option<StrategyImages>,
}

impl Default for BptRenderer {
    fn default() -> Self {
        Self {
            rr_depth: 1,
            max_path_vertices: -1,
            mis: MisWeight::Power { beta: 2.0 },
            initial_sampler: None,
            images: None,
        }
    }
}

impl Renderer for BptRenderer {
    fn type_name(&self) -> &'static str {
        "bpt"
    }

    fn configure(&mut self, node: &ConfigNode<'_>, scene: &Scene) -> RenderResult<()> {
        self.rr_depth = node.child_value_or_default("rr_depth", 1)?;
        self.max_path_vertices = node.child_value_or_default("max_path_vertices", -1)?;
        self.mis = MisWeight::configure(node)?;
        self.initial_sampler = Some(InitialSampler::configure(node)?);

        if let Some(experimental) = node.child("experimental") {
            log::warn!("Experimental mode is enabled");
            let max_subpath_num_vertices: usize =
                experimental.child_value_or_default("max_subpath_num_vertices", 3)?;
            let dir: String = experimental.child_value_or_default("subpath_image_dir", "bpt".to_string())?;
            // Strategy images need at least that many vertices per subpath
            if self.rr_depth != -1 {
                self.rr_depth = self.rr_depth.max(max_subpath_num_vertices as i32);
            }
            self.images = Some(StrategyImages {
                max_subpath_num_vertices,
                dir: PathBuf::from(dir),
                template: scene.main_camera().film().clone_empty(),
                strategies: Mutex::new(BTreeMap::new()),
                lengths: Mutex::new(BTreeMap::new()),
            });
        }

        log::info!(
            "rr_depth {}, max_path_vertices {}",
            self.rr_depth,
            self.max_path_vertices
        );
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
        Ok(Box::new(BptRenderProcess {
            renderer: self,
            scene,
            sampler: initial_sampler.create_sampler()?,
            film: scene.main_camera().film().clone_empty(),
            pool: PathVertexPool::new(),
            light: Subpath::new(TransportDirection::LE),
            eye: Subpath::new(TransportDirection::EL),
        }))
    }

    fn postprocess(&self, _scene: &Scene, output: &mut RenderOutput) -> RenderResult<()> {
        if let Some(images) = &self.images {
            images.save(output.processed_samples)?;
        }
        Ok(())
    }
}

struct BptRenderProcess<'a> {
    renderer: &'a BptRenderer,
    scene: &'a Scene,
    sampler: Box<dyn Sampler>,
    film: Film,
    pool: PathVertexPool<'a>,
    light: Subpath,
    eye: Subpath,
}

impl RenderProcess for BptRenderProcess<'_> {
    fn process_single_sample(&mut self) {
        let renderer = self.renderer;
        self.pool.release();
        self.sampler.begin_sample();
        self.light.sample(
            self.scene,
            &mut *self.sampler,
            &mut self.pool,
            renderer.rr_depth,
            renderer.max_path_vertices,
        );
        self.eye.sample(
            self.scene,
            &mut *self.sampler,
            &mut self.pool,
            renderer.rr_depth,
            renderer.max_path_vertices,
        );

        let film = &mut self.film;
        evaluate_strategies(
            self.scene,
            &self.pool,
            &self.light,
            &self.eye,
            &renderer.mis,
            renderer.max_path_vertices,
            |path, contrib, raster, weight| {
                film.accumulate_contribution(raster, contrib * weight);
                if let Some(images) = &renderer.images {
                    images.record(path.s, path.t, raster, contrib, weight);
                }
            },
        );
    }

    fn film(&self) -> &Film {
        &self.film
    }
}
