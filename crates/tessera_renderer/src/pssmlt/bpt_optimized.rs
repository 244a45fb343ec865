use tessera_core::{ConfigNode, Film, PrimarySampler, Sampler, Scene};

use super::path_sampler::{BptPathSampler, PathSampler, PathSamplerKind};
use super::renderer::{check_restored, Estimator, MetropolisParams, SeedCandidates, Transition};
use super::splat::Splats;
use crate::bpt::MisWeight;
use crate::initial_sampler::InitialSampler;
use crate::{ProgressCallback, RenderError, RenderProcess, RenderResult, Renderer};

/// PSSMLT over BPT with separate primary sample spaces for the light and
/// the eye subpath (`pssmlt.bptopt`).
///
/// A small step on one subpath leaves the random numbers of the other
/// untouched, so mutations stay coherent however long either subpath is.
/// Both samplers take the same large-step decision and are accepted or
/// rejected together.
pub struct BptOptimizedPssmltRenderer {
    params: MetropolisParams,
    mis: Option<MisWeight>,
    estimator: Estimator,
    initial_sampler: Option<InitialSampler>,
    seeds: SeedCandidates,
}

impl Default for BptOptimizedPssmltRenderer {
    fn default() -> Self {
        Self {
            params: MetropolisParams::default(),
            mis: None,
            estimator: Estimator::Mvs,
            initial_sampler: None,
            seeds: SeedCandidates::default(),
        }
    }
}

impl BptOptimizedPssmltRenderer {
    fn configured(&self) -> RenderResult<(&InitialSampler, MisWeight)> {
        match (&self.initial_sampler, self.mis) {
            (Some(initial_sampler), Some(mis)) => Ok((initial_sampler, mis)),
            _ => Err(RenderError::Process("renderer is not configured".to_string())),
        }
    }
}

impl Renderer for BptOptimizedPssmltRenderer {
    fn type_name(&self) -> &'static str {
        "pssmlt.bptopt"
    }

    fn configure(&mut self, node: &ConfigNode<'_>, _scene: &Scene) -> RenderResult<()> {
        self.initial_sampler = Some(InitialSampler::configure_random(node)?);
        match PathSamplerKind::configure(node)? {
            PathSamplerKind::Bpt(mis) => self.mis = Some(mis),
            PathSamplerKind::Pt => {
                log::error!("Path sampler type must be 'bpt'");
                return Err(RenderError::Invalid("path sampler type must be 'bpt'".to_string()));
            }
        }
        self.estimator = Estimator::configure(node, Estimator::Mvs)?;
        self.params = MetropolisParams::configure(node)?;
        log::info!("{:?}, estimator {:?}", self.params, self.estimator);
        Ok(())
    }

    fn preprocess(&mut self, scene: &Scene, progress: &ProgressCallback) -> RenderResult<()> {
        progress(0.0, false);
        let (initial_sampler, mis) = self.configured()?;
        let rr_depth = self.params.rr_depth;
        // Both subpaths come from the one seed stream, light subpath first
        let mut path_sampler = BptPathSampler::new(mis);
        let seeds = SeedCandidates::search(
            initial_sampler,
            self.params.num_seed_samples,
            progress,
            |sampler, splats| path_sampler.sample_and_evaluate(scene, sampler, splats, rr_depth, -1),
        )?;
        self.seeds = seeds;
        progress(1.0, true);
        Ok(())
    }

    fn create_render_process<'a>(
        &'a self,
        scene: &'a Scene,
        _thread_id: usize,
        num_threads: usize,
    ) -> RenderResult<Box<dyn RenderProcess + 'a>> {
        let (initial_sampler, mis) = self.configured()?;
        let seed = self.seeds.seed_for_worker(initial_sampler, num_threads)?;
        let rr_depth = self.params.rr_depth;

        let mut light_sampler = self.params.primary_sampler(initial_sampler)?;
        let mut eye_sampler = self.params.primary_sampler(initial_sampler)?;
        let mut path_sampler = BptPathSampler::new(mis);
        let mut current = Splats::default();

        // The seed stream feeds the light sampler, then carries on into the
        // eye sampler where the light subpath left it
        path_sampler.release();
        light_sampler.begin_restore(Box::new(self.seeds.stream_at(&seed)));
        path_sampler.sample_light_subpath(scene, &mut light_sampler, rr_depth, -1);
        let stream = light_sampler
            .end_restore()
            .ok_or_else(|| RenderError::Process("seed stream was not restored".to_string()))?;
        eye_sampler.begin_restore(stream);
        path_sampler.sample_eye_subpath(scene, &mut eye_sampler, rr_depth, -1);
        eye_sampler.end_restore();
        path_sampler.evaluate(scene, &mut current, -1);
        light_sampler.accept();
        eye_sampler.accept();
        check_restored(&seed, &current)?;

        Ok(Box::new(BptOptimizedPssmltProcess {
            renderer: self,
            scene,
            random: initial_sampler.create_random_sampler()?,
            light_sampler,
            eye_sampler,
            path_sampler,
            current,
            proposed: Splats::default(),
            film: scene.main_camera().film().clone_empty(),
        }))
    }
}

struct BptOptimizedPssmltProcess<'a> {
    renderer: &'a BptOptimizedPssmltRenderer,
    scene: &'a Scene,
    random: Box<dyn Sampler>,
    light_sampler: PrimarySampler,
    eye_sampler: PrimarySampler,
    path_sampler: BptPathSampler<'a>,
    current: Splats,
    proposed: Splats,
    film: Film,
}

impl RenderProcess for BptOptimizedPssmltProcess<'_> {
    fn process_single_sample(&mut self) {
        let renderer = self.renderer;
        let params = &renderer.params;

        let large_step = self.random.next() < params.large_step_prob;
        self.light_sampler.enable_large_step(large_step);
        self.eye_sampler.enable_large_step(large_step);
        self.path_sampler.sample_and_evaluate_bidir(
            self.scene,
            &mut self.light_sampler,
            &mut self.eye_sampler,
            &mut self.proposed,
            params.rr_depth,
            -1,
        );

        let current_i = self.current.sum_luminance();
        let proposed_i = self.proposed.sum_luminance();
        let acceptance = Transition::acceptance(current_i, proposed_i);
        let accepted = self.random.next() < acceptance;
        if accepted {
            self.light_sampler.accept();
            self.eye_sampler.accept();
        } else {
            self.light_sampler.reject();
            self.eye_sampler.reject();
        }

        renderer.estimator.accumulate(
            &mut self.film,
            &Transition {
                current: &self.current,
                proposed: &self.proposed,
                current_i,
                proposed_i,
                acceptance,
                large_step,
                accepted,
            },
            renderer.seeds.norm,
            params.large_step_prob,
        );

        if accepted {
            std::mem::swap(&mut self.current, &mut self.proposed);
        }
    }

    fn film(&self) -> &Film {
        &self.film
    }
}
