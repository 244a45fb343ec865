//! Tessera renderers - Monte Carlo light transport
//!
//! Every algorithm is a [`Renderer`] that is configured from the `renderer`
//! element of the scene document, optionally preprocesses the scene (photon
//! tracing, Metropolis seed search) and then hands out one
//! [`RenderProcess`] per worker thread. The [`scheduler`] drives the
//! processes in blocks of samples and merges their films.

pub mod bpt;
pub mod lt;
pub mod pm;
pub mod pssmlt;
pub mod pt;
pub mod ptdirect;
pub mod ptmis;
pub mod scheduler;
pub mod utils;

mod initial_sampler;

#[cfg(test)]
pub(crate) mod testing;

pub use scheduler::{RenderOutput, RenderScheduler};

use thiserror::Error;
use tessera_core::{
    AssetError, Config, ConfigError, ConfigNode, Film, FilmError, LogIndenter, Scene, SceneError,
};

/// Errors raised while configuring or running a renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Film(#[from] FilmError),

    #[error("Unknown renderer type '{0}'")]
    UnknownRenderer(String),

    #[error("Invalid renderer configuration: {0}")]
    Invalid(String),

    #[error("Preprocess failed: {0}")]
    Preprocess(String),

    #[error("Failed to create render process: {0}")]
    Process(String),

    #[error("Failed to start worker threads: {0}")]
    ThreadPool(String),

    #[error("Render operation has been canceled")]
    Cancelled,
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Progress observer: fraction done in `[0, 1]` and a completion flag.
pub type ProgressCallback = dyn Fn(f64, bool) + Send + Sync;

/// A light transport algorithm.
pub trait Renderer: Send + Sync {
    /// Name used in the `type` attribute of the `renderer` element.
    fn type_name(&self) -> &'static str;

    fn configure(&mut self, node: &ConfigNode<'_>, scene: &Scene) -> RenderResult<()>;

    /// Work done once before sampling starts.
    fn preprocess(&mut self, _scene: &Scene, _progress: &ProgressCallback) -> RenderResult<()> {
        Ok(())
    }

    /// Per-thread sampling state for worker `thread_id` of `num_threads`.
    fn create_render_process<'a>(
        &'a self,
        scene: &'a Scene,
        thread_id: usize,
        num_threads: usize,
    ) -> RenderResult<Box<dyn RenderProcess + 'a>>;

    /// Work done on the merged film once sampling has finished.
    fn postprocess(&self, _scene: &Scene, _output: &mut RenderOutput) -> RenderResult<()> {
        Ok(())
    }
}

/// Sampling state owned by one worker thread.
pub trait RenderProcess: Send {
    /// Draw one sample and splat its contribution to the film.
    fn process_single_sample(&mut self);

    fn film(&self) -> &Film;
}

/// Create a renderer by type name.
pub fn create(ty: &str) -> RenderResult<Box<dyn Renderer>> {
    let renderer: Box<dyn Renderer> = match ty {
        "pt" => Box::new(pt::PathTraceRenderer::default()),
        "ptdirect" => Box::new(ptdirect::DirectPathTraceRenderer::default()),
        "ptmis" => Box::new(ptmis::MisPathTraceRenderer::default()),
        "lt" => Box::new(lt::LightTraceRenderer::default()),
        "bpt" => Box::new(bpt::BptRenderer::default()),
        "pm" => Box::new(pm::PhotonMappingRenderer::default()),
        "pssmlt" => Box::new(pssmlt::PssmltRenderer::default()),
        "pssmlt.bptopt" => Box::new(pssmlt::BptOptimizedPssmltRenderer::default()),
        _ => return Err(RenderError::UnknownRenderer(ty.to_string())),
    };
    Ok(renderer)
}

/// Run the renderer described by `config` on `scene`.
///
/// Scheduler options are read from the `scheduler` child of the `renderer`
/// element when present, otherwise from the `renderer` element itself.
pub fn render(
    config: &Config,
    scene: &Scene,
    progress: Option<Box<ProgressCallback>>,
) -> RenderResult<RenderOutput> {
    let node = config.renderer()?;
    let ty = node.required_attribute("type")?;
    let mut renderer = create(ty)?;

    {
        log::info!("Configuring renderer '{}'", ty);
        let _indent = LogIndenter::new();
        renderer.configure(&node, scene)?;
    }

    let mut scheduler = RenderScheduler::configure(&node.child("scheduler").unwrap_or(node))?;
    if let Some(progress) = progress {
        scheduler.set_progress_callback(progress);
    }

    {
        log::info!("Preprocessing");
        let _indent = LogIndenter::new();
        renderer.preprocess(scene, scheduler.progress_callback())?;
    }

    let mut output = {
        log::info!("Rendering");
        let _indent = LogIndenter::new();
        scheduler.render(&*renderer, scene)?
    };

    renderer.postprocess(scene, &mut output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_known_renderers() {
        for ty in ["pt", "ptdirect", "ptmis", "lt", "bpt", "pm", "pssmlt", "pssmlt.bptopt"] {
            let renderer = create(ty).unwrap();
            assert_eq!(renderer.type_name(), ty);
        }
    }

    #[test]
    fn test_create_unknown_renderer() {
        assert!(matches!(create("dagpt"), Err(RenderError::UnknownRenderer(_))));
    }

    /// Mean luminance of the room with the given floor, rendered with
    /// `ty` and the extra renderer elements in `extra`.
    fn render_room(floor: &str, ty: &str, num_samples: u64, extra: &str) -> f32 {
        let output = testing::render_document(&testing::room_document(
            floor,
            &format!(
                r#"{{
                    "type": "{ty}", "num_samples": {num_samples}, "num_threads": 4,
                    "mis_weight": {{ "type": "power" }},
                    "sampler": {{ "type": "random", "rng_seed": 7 }}
                    {extra}
                }}"#
            ),
        ));
        assert!(testing::is_valid_image(&output.film), "{} on {}", ty, floor);
        testing::mean_luminance(&output.film)
    }

    fn assert_agrees(label: &str, mean: f32, reference: f32, tolerance: f32) {
        let error = (mean - reference).abs() / reference;
        assert!(error < tolerance, "{}: {} vs bpt {}", label, mean, reference);
    }

    #[test]
    fn test_unbiased_renderers_agree() {
        let reference = render_room("white", "bpt", 40000, "");
        assert!(reference > 0.0);
        for (ty, num_samples) in [("pt", 80000), ("ptdirect", 40000), ("ptmis", 40000), ("lt", 80000)] {
            assert_agrees(ty, render_room("white", ty, num_samples, ""), reference, 0.15);
        }
    }

    #[test]
    fn test_renderers_agree_on_specular_floors() {
        for floor in ["mirror", "glass"] {
            let reference = render_room(floor, "bpt", 80000, "");
            assert!(reference > 0.0, "{}", floor);
            for (ty, num_samples) in [("pt", 160000), ("ptmis", 80000), ("lt", 160000)] {
                let mean = render_room(floor, ty, num_samples, "");
                assert_agrees(&format!("{} on {}", ty, floor), mean, reference, 0.2);
            }
        }
    }

    #[test]
    fn test_metropolis_renderers_agree() {
        let reference = render_room("white", "bpt", 40000, "");
        let renderers = [
            (
                "pssmlt",
                r#", "num_seed_samples": 20000, "estimator_mode": "mvs_mis",
                   "path_sampler": { "type": "bpt", "mis_weight": { "type": "power" } }"#,
            ),
            (
                "pssmlt",
                r#", "num_seed_samples": 20000, "estimator_mode": "normal",
                   "path_sampler": { "type": "pt" }"#,
            ),
            (
                "pssmlt.bptopt",
                r#", "num_seed_samples": 20000,
                   "path_sampler": { "type": "bpt", "mis_weight": { "type": "power" } }"#,
            ),
        ];
        for (ty, extra) in renderers {
            let mean = render_room("white", ty, 40000, extra);
            assert_agrees(ty, mean, reference, 0.2);
        }
    }

    #[test]
    fn test_stratified_sampling_agrees_with_random() {
        let reference = render_room("white", "pt", 80000, "");
        let output = testing::render_document(&testing::room_document(
            "white",
            r#"{
                "type": "pt", "num_samples": 80000, "num_threads": 4,
                "sampler": { "type": "stratified", "strata": 4, "rng_seed": 7 }
            }"#,
        ));
        assert!(testing::is_valid_image(&output.film));
        assert_agrees("stratified pt", testing::mean_luminance(&output.film), reference, 0.15);
    }
}
