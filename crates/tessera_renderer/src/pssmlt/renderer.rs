use tessera_core::{ConfigNode, Film, PrimarySampler, RewindableSampler, Sampler, Scene};
use tessera_math::{constants, DiscreteDistribution1D};

use super::path_sampler::{PathSampler, PathSamplerKind};
use super::splat::Splats;
use crate::initial_sampler::InitialSampler;
use crate::{ProgressCallback, RenderError, RenderProcess, RenderResult, Renderer};

/// How the states visited by the chain are splatted to the film.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimator {
    /// Only the state the chain moved to.
    Normal,
    /// Mean value substitution: both states, weighted by acceptance.
    Mvs,
    /// Mean value substitution with large steps combined by MIS.
    MvsMis,
}

impl Estimator {
    /// Read `estimator_mode`, warning when it is missing.
    pub fn configure(node: &ConfigNode<'_>, default: Estimator) -> RenderResult<Self> {
        let Some(mode) = node.child("estimator_mode") else {
            log::warn!("Missing 'estimator_mode' element. Using default value {:?}", default);
            return Ok(default);
        };
        match mode.parse::<String>()?.as_str() {
            "normal" => Ok(Estimator::Normal),
            "mvs" => Ok(Estimator::Mvs),
            "mvs_mis" => Ok(Estimator::MvsMis),
            other => {
                log::error!("Invalid estimator mode '{}'", other);
                Err(RenderError::Invalid(format!("unknown estimator mode '{}'", other)))
            }
        }
    }

    /// Splat one Metropolis transition.
    ///
    /// `current` is the state before the transition; `norm` is the
    /// normalization factor `b` and `large_step_prob` the large step
    /// probability.
    pub fn accumulate(
        &self,
        film: &mut Film,
        transition: &Transition<'_>,
        norm: f32,
        large_step_prob: f32,
    ) {
        let Transition {
            current,
            proposed,
            current_i,
            proposed_i,
            acceptance: a,
            large_step,
            accepted,
        } = *transition;

        match self {
            Estimator::Normal => {
                let (state, i) = if accepted { (proposed, proposed_i) } else { (current, current_i) };
                if i > 0.0 {
                    state.accumulate_to(film, norm / i);
                }
            }
            Estimator::Mvs => {
                if proposed_i > 0.0 {
                    current.accumulate_to(film, (1.0 - a) * norm / current_i);
                    proposed.accumulate_to(film, a * norm / proposed_i);
                } else if current_i > 0.0 {
                    current.accumulate_to(film, norm / current_i);
                }
            }
            Estimator::MvsMis => {
                let large = if large_step { 1.0 } else { 0.0 };
                // Without large steps a zero-contribution state has no weight
                let weight = |w: f32, i: f32| {
                    let denom = i / norm + large_step_prob;
                    if denom > 0.0 {
                        w / denom
                    } else {
                        0.0
                    }
                };
                current.accumulate_to(film, weight(1.0 - a, current_i));
                proposed.accumulate_to(film, weight(a + large, proposed_i));
            }
        }
    }
}

/// A proposal and the decision taken on it.
#[derive(Clone, Copy)]
pub struct Transition<'s> {
    pub current: &'s Splats,
    pub proposed: &'s Splats,
    pub current_i: f32,
    pub proposed_i: f32,
    /// Acceptance probability `min(1, I_proposed / I_current)`.
    pub acceptance: f32,
    pub large_step: bool,
    pub accepted: bool,
}

impl Transition<'_> {
    pub fn acceptance(current_i: f32, proposed_i: f32) -> f32 {
        if current_i == 0.0 {
            1.0
        } else {
            (proposed_i / current_i).min(1.0)
        }
    }
}

/// Starting point of a chain: a position in the seed stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSeed {
    /// Sample index of the rewindable stream where the path starts.
    pub index: u64,
    /// Luminance of the path's splats.
    pub luminance: f32,
}

/// Result of the seed search: chain seeds and the normalization factor.
#[derive(Debug, Default)]
pub struct SeedCandidates {
    /// Seed of the rewindable stream the candidates index into.
    pub stream_seed: u64,
    /// Mean luminance `b` over every seed sample, zeros included.
    pub norm: f32,
    pub candidates: Vec<PathSeed>,
    distribution: DiscreteDistribution1D,
}

impl SeedCandidates {
    /// Draw `num_seed_samples` independent paths from a fresh rewindable
    /// stream and keep those with a non-zero contribution.
    pub(crate) fn search<F>(
        initial_sampler: &InitialSampler,
        num_seed_samples: u64,
        progress: &ProgressCallback,
        mut evaluate: F,
    ) -> RenderResult<Self>
    where
        F: FnMut(&mut RewindableSampler, &mut Splats),
    {
        let stream_seed = initial_sampler.next_seed();
        let mut sampler = RewindableSampler::new(stream_seed);
        let mut splats = Splats::default();
        let mut candidates = Vec::new();
        let mut sum = 0.0;

        for sample in 0..num_seed_samples {
            let index = sampler.sample_index();
            evaluate(&mut sampler, &mut splats);
            let luminance = splats.sum_luminance();
            if luminance > 0.0 {
                sum += luminance;
                candidates.push(PathSeed { index, luminance });
            }
            progress(sample as f64 / num_seed_samples as f64, false);
        }

        let mut distribution = DiscreteDistribution1D::new();
        for candidate in &candidates {
            distribution.add(candidate.luminance);
        }
        if !distribution.normalize() {
            return Err(RenderError::Preprocess(
                "no seed sample with non-zero contribution".to_string(),
            ));
        }

        let norm = sum / num_seed_samples as f32;
        log::info!(
            "Found {} seed candidates, normalization factor {}",
            candidates.len(),
            norm
        );
        Ok(Self {
            stream_seed,
            norm,
            candidates,
            distribution,
        })
    }

    /// Pick a candidate with probability proportional to its luminance.
    pub fn choose(&self, u: f32) -> PathSeed {
        self.candidates[self.distribution.sample(u)]
    }

    /// Rewindable stream positioned at the start of `seed`.
    pub fn stream_at(&self, seed: &PathSeed) -> RewindableSampler {
        let mut sampler = RewindableSampler::new(self.stream_seed);
        sampler.rewind(seed.index);
        sampler
    }

    /// Seed for a worker, checking there are enough candidates to go round.
    pub(crate) fn seed_for_worker(&self, initial_sampler: &InitialSampler, num_threads: usize) -> RenderResult<PathSeed> {
        if self.candidates.len() < num_threads {
            log::error!("Number of candidates is too small");
            return Err(RenderError::Process(format!(
                "{} seed candidates for {} threads",
                self.candidates.len(),
                num_threads
            )));
        }
        Ok(self.choose(initial_sampler.next()))
    }
}

/// Check a restored seed path against the recorded luminance.
pub(crate) fn check_restored(seed: &PathSeed, splats: &Splats) -> RenderResult<()> {
    let restored = splats.sum_luminance();
    if (restored - seed.luminance).abs() > constants::EPS {
        log::error!("Failed to reconstruct a seed path, invalid luminance");
        return Err(RenderError::Process(format!(
            "seed path luminance {} restored as {}",
            seed.luminance, restored
        )));
    }
    Ok(())
}

/// Parameters shared by the Metropolis renderers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetropolisParams {
    pub rr_depth: i32,
    pub num_seed_samples: u64,
    pub large_step_prob: f32,
    pub kernel_size_s1: f32,
    pub kernel_size_s2: f32,
}

impl Default for MetropolisParams {
    fn default() -> Self {
        Self {
            rr_depth: 1,
            num_seed_samples: 1,
            large_step_prob: 0.1,
            kernel_size_s1: 1.0 / 1024.0,
            kernel_size_s2: 1.0 / 64.0,
        }
    }
}

impl MetropolisParams {
    pub fn configure(node: &ConfigNode<'_>) -> RenderResult<Self> {
        let defaults = Self::default();
        let params = Self {
            rr_depth: node.child_value_or_default("rr_depth", defaults.rr_depth)?,
            num_seed_samples: node.child_value_or_default("num_seed_samples", defaults.num_seed_samples)?,
            large_step_prob: node.child_value_or_default("large_step_prob", defaults.large_step_prob)?,
            kernel_size_s1: node.child_value_or_default("kernel_size_s1", defaults.kernel_size_s1)?,
            kernel_size_s2: node.child_value_or_default("kernel_size_s2", defaults.kernel_size_s2)?,
        };
        if !(0.0..=1.0).contains(&params.large_step_prob) {
            log::error!("'large_step_prob' must be in [0, 1]");
            return Err(RenderError::Invalid(format!(
                "large_step_prob = {}",
                params.large_step_prob
            )));
        }
        if params.num_seed_samples == 0 {
            return Err(RenderError::Invalid("'num_seed_samples' must be positive".to_string()));
        }
        if !(params.kernel_size_s1 > 0.0 && params.kernel_size_s1 <= params.kernel_size_s2) {
            return Err(RenderError::Invalid(
                "kernel sizes must satisfy 0 < kernel_size_s1 <= kernel_size_s2".to_string(),
            ));
        }
        Ok(params)
    }

    pub(crate) fn primary_sampler(&self, initial_sampler: &InitialSampler) -> RenderResult<PrimarySampler> {
        Ok(PrimarySampler::new(
            initial_sampler.create_random_sampler()?,
            self.kernel_size_s1,
            self.kernel_size_s2,
        ))
    }
}

/// Primary sample space Metropolis light transport (`pssmlt`).
///
/// One Markov chain per worker thread runs over the uniform numbers fed to
/// a path sampler, following Kelemen et al. 2002.
pub struct PssmltRenderer {
    params: MetropolisParams,
    path_sampler: Option<PathSamplerKind>,
    estimator: Estimator,
    initial_sampler: Option<InitialSampler>,
    seeds: SeedCandidates,
}

impl Default for PssmltRenderer {
    fn default() -> Self {
        Self {
            params: MetropolisParams::default(),
            path_sampler: None,
            estimator: Estimator::MvsMis,
            initial_sampler: None,
            seeds: SeedCandidates::default(),
        }
    }
}

impl PssmltRenderer {
    fn configured(&self) -> RenderResult<(&InitialSampler, PathSamplerKind)> {
        match (&self.initial_sampler, self.path_sampler) {
            (Some(initial_sampler), Some(path_sampler)) => Ok((initial_sampler, path_sampler)),
            _ => Err(RenderError::Process("renderer is not configured".to_string())),
        }
    }
}

impl Renderer for PssmltRenderer {
    fn type_name(&self) -> &'static str {
        "pssmlt"
    }

    fn configure(&mut self, node: &ConfigNode<'_>, _scene: &Scene) -> RenderResult<()> {
        self.initial_sampler = Some(InitialSampler::configure_random(node)?);
        self.path_sampler = Some(PathSamplerKind::configure(node)?);
        self.estimator = Estimator::configure(node, Estimator::MvsMis)?;
        self.params = MetropolisParams::configure(node)?;
        log::info!("{:?}, estimator {:?}", self.params, self.estimator);
        Ok(())
    }

    fn preprocess(&mut self, scene: &Scene, progress: &ProgressCallback) -> RenderResult<()> {
        progress(0.0, false);
        let (initial_sampler, kind) = self.configured()?;
        let rr_depth = self.params.rr_depth;
        let mut path_sampler = kind.create();
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
        let (initial_sampler, kind) = self.configured()?;
        let seed = self.seeds.seed_for_worker(initial_sampler, num_threads)?;

        let mut sampler = self.params.primary_sampler(initial_sampler)?;
        let mut path_sampler = kind.create();
        let mut current = Splats::default();

        // Replay the seed path as the initial state of the chain
        sampler.begin_restore(Box::new(self.seeds.stream_at(&seed)));
        path_sampler.sample_and_evaluate(scene, &mut sampler, &mut current, self.params.rr_depth, -1);
        sampler.end_restore();
        sampler.accept();
        check_restored(&seed, &current)?;

        Ok(Box::new(PssmltProcess {
            renderer: self,
            scene,
            random: initial_sampler.create_random_sampler()?,
            sampler,
            path_sampler,
            current,
            proposed: Splats::default(),
            film: scene.main_camera().film().clone_empty(),
        }))
    }
}

struct PssmltProcess<'a> {
    renderer: &'a PssmltRenderer,
    scene: &'a Scene,
    /// Drives the large-step and acceptance decisions.
    random: Box<dyn Sampler>,
    sampler: PrimarySampler,
    path_sampler: Box<dyn PathSampler<'a> + 'a>,
    current: Splats,
    proposed: Splats,
    film: Film,
}

impl RenderProcess for PssmltProcess<'_> {
    fn process_single_sample(&mut self) {
        let renderer = self.renderer;
        let params = &renderer.params;

        let large_step = self.random.next() < params.large_step_prob;
        self.sampler.enable_large_step(large_step);
        self.path_sampler.sample_and_evaluate(
            self.scene,
            &mut self.sampler,
            &mut self.proposed,
            params.rr_depth,
            -1,
        );

        let current_i = self.current.sum_luminance();
        let proposed_i = self.proposed.sum_luminance();
        let acceptance = Transition::acceptance(current_i, proposed_i);
        let accepted = self.random.next() < acceptance;
        if accepted {
            self.sampler.accept();
        } else {
            self.sampler.reject();
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

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::AcceleratorKind;
    use tessera_math::{luminance, Color, Vec2};

    use super::super::splat::Splat;
    use crate::testing;

    fn configured(renderer: &str) -> (PssmltRenderer, Scene) {
        let document = testing::room_document("white", renderer);
        let (config, scene) = testing::load(&document, AcceleratorKind::Bvh);
        let mut pssmlt = PssmltRenderer::default();
        pssmlt.configure(&config.renderer().unwrap(), &scene).unwrap();
        (pssmlt, scene)
    }

    fn single(l: f32) -> Splats {
        Splats {
            splats: vec![Splat {
                s: 0,
                t: 0,
                raster: Vec2::splat(0.5),
                l: Color::splat(l),
            }],
        }
    }

    #[test]
    fn test_seed_paths_are_reproduced() {
        let (mut pssmlt, scene) = configured(
            r#"{
                "type": "pssmlt", "num_seed_samples": 64,
                "path_sampler": { "type": "bpt", "mis_weight": { "type": "power" } },
                "sampler": { "type": "random", "rng_seed": 1 }
            }"#,
        );
        pssmlt.preprocess(&scene, &|_, _| {}).unwrap();
        assert!(!pssmlt.seeds.candidates.is_empty());

        let kind = pssmlt.path_sampler.unwrap();
        let mut path_sampler = kind.create();
        let mut splats = Splats::default();
        for seed in &pssmlt.seeds.candidates {
            let mut stream = pssmlt.seeds.stream_at(seed);
            path_sampler.sample_and_evaluate(&scene, &mut stream, &mut splats, 1, -1);
            assert!((splats.sum_luminance() - seed.luminance).abs() < 1e-6);
        }

        // Restoring through the primary sampler reproduces the same path
        assert!(pssmlt.create_render_process(&scene, 0, 1).is_ok());
    }

    #[test]
    fn test_normalization_is_mean_over_all_seed_samples() {
        let (mut pssmlt, scene) = configured(
            r#"{
                "type": "pssmlt", "num_seed_samples": 200,
                "path_sampler": { "type": "pt" },
                "sampler": { "type": "random", "rng_seed": 4 }
            }"#,
        );
        pssmlt.preprocess(&scene, &|_, _| {}).unwrap();
        let sum: f32 = pssmlt.seeds.candidates.iter().map(|c| c.luminance).sum();
        assert!((pssmlt.seeds.norm - sum / 200.0).abs() < 1e-5);
        assert!(pssmlt.seeds.candidates.iter().all(|c| c.luminance > 0.0));
    }

    #[test]
    fn test_too_few_candidates_for_threads() {
        let (mut pssmlt, scene) = configured(
            r#"{
                "type": "pssmlt", "num_seed_samples": 8,
                "path_sampler": { "type": "bpt", "mis_weight": { "type": "power" } },
                "sampler": { "type": "random", "rng_seed": 2 }
            }"#,
        );
        pssmlt.preprocess(&scene, &|_, _| {}).unwrap();
        let n = pssmlt.seeds.candidates.len();
        assert!(pssmlt.create_render_process(&scene, 0, n + 1).is_err());
    }

    #[test]
    fn test_estimators_split_weight_between_states() {
        let current = single(2.0);
        let proposed = single(1.0);
        let transition = Transition {
            current: &current,
            proposed: &proposed,
            current_i: current.sum_luminance(),
            proposed_i: proposed.sum_luminance(),
            acceptance: 0.5,
            large_step: false,
            accepted: false,
        };
        let total = |estimator: Estimator| {
            let mut film = Film::new(1, 1);
            estimator.accumulate(&mut film, &transition, 1.0, 0.1);
            luminance(film.pixel(0, 0))
        };

        // Each estimator adds b per transition when states carry luminance I
        assert!((total(Estimator::Normal) - 1.0).abs() < 1e-4);
        assert!((total(Estimator::Mvs) - 1.0).abs() < 1e-4);
        let expected = 0.5 * 2.0 / (2.0 + 0.1) + 0.5 * 1.0 / (1.0 + 0.1);
        assert!((total(Estimator::MvsMis) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_mvs_mis_without_large_steps_stays_finite() {
        let current = single(1.0);
        let proposed = Splats::default();
        let transition = Transition {
            current: &current,
            proposed: &proposed,
            current_i: 1.0,
            proposed_i: 0.0,
            acceptance: 0.0,
            large_step: false,
            accepted: false,
        };
        let mut film = Film::new(1, 1);
        Estimator::MvsMis.accumulate(&mut film, &transition, 1.0, 0.0);
        let pixel = film.pixel(0, 0);
        assert!(pixel.is_finite());
        // All weight stays on the current state: (1 - 0) / (1 / 1 + 0)
        assert!((luminance(pixel) - 1.0).abs() < 1e-5);

        // A proposal with no splats but a recorded zero luminance
        let zero = single(0.0);
        let transition = Transition {
            proposed: &zero,
            ..transition
        };
        Estimator::MvsMis.accumulate(&mut film, &transition, 1.0, 0.0);
        assert!(film.pixel(0, 0).is_finite());
    }

    #[test]
    fn test_large_step_probability_range() {
        for (p, ok) in [(0.0, true), (0.3, true), (1.0, true), (-0.1, false), (1.5, false)] {
            let value = serde_json::json!({ "large_step_prob": p });
            let node = ConfigNode::new("renderer", &value);
            assert_eq!(MetropolisParams::configure(&node).is_ok(), ok, "{}", p);
        }
    }

    #[test]
    fn test_estimator_mode_names() {
        let value = serde_json::json!({ "estimator_mode": "mvs" });
        let node = ConfigNode::new("renderer", &value);
        assert_eq!(Estimator::configure(&node, Estimator::MvsMis).unwrap(), Estimator::Mvs);

        let value = serde_json::json!({});
        let node = ConfigNode::new("renderer", &value);
        assert_eq!(Estimator::configure(&node, Estimator::MvsMis).unwrap(), Estimator::MvsMis);

        let value = serde_json::json!({ "estimator_mode": "erpt" });
        let node = ConfigNode::new("renderer", &value);
        assert!(Estimator::configure(&node, Estimator::MvsMis).is_err());
    }

    #[test]
    fn test_renders_room() {
        for (path_sampler, mode) in [
            (r#"{ "type": "bpt", "mis_weight": { "type": "power" } }"#, "mvs_mis"),
            (r#"{ "type": "bpt", "mis_weight": { "type": "simple" } }"#, "mvs"),
            (r#"{ "type": "pt" }"#, "normal"),
        ] {
            let output = testing::render_document(&testing::room_document(
                "white",
                &format!(
                    r#"{{
                        "type": "pssmlt", "num_samples": 2000, "num_threads": 2,
                        "num_seed_samples": 2000, "estimator_mode": "{mode}",
                        "path_sampler": {path_sampler},
                        "sampler": {{ "type": "random", "rng_seed": 1 }}
                    }}"#
                ),
            ));
            assert!(testing::is_valid_image(&output.film));
            assert!(testing::mean_luminance(&output.film) > 0.0);
        }
    }
}
