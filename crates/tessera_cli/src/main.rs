use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tessera_core::{logging, Config, Scene};

/// Render a scene document with a Monte Carlo light transport algorithm.
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about)]
struct Args {
    /// Scene document (JSON)
    input: Option<PathBuf>,

    /// Output image; the extension selects the format (.hdr, .exr, .png)
    #[arg(short, long, default_value = "result.hdr")]
    output: PathBuf,

    /// Base path for relative asset paths [default: directory of the input]
    #[arg(short, long)]
    base: Option<PathBuf>,

    /// Read the scene document from stdin
    #[arg(short, long)]
    interactive: bool,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

fn init_logger(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}{}",
                buf.timestamp(),
                record.level(),
                logging::indentation(),
                record.args()
            )
        })
        .init();
}

fn load_config(args: &Args) -> Result<Config> {
    if args.interactive {
        let mut document = String::new();
        std::io::stdin()
            .read_to_string(&mut document)
            .context("Failed to read the scene document from stdin")?;
        let base = args.base.clone().unwrap_or_else(|| PathBuf::from("."));
        return Config::load_from_str(&document, base).context("Failed to parse the scene document");
    }

    let input = args
        .input
        .as_deref()
        .context("No input document given; pass a path or use --interactive")?;
    Config::load(input, args.base.as_deref())
        .with_context(|| format!("Failed to load scene document '{}'", input.display()))
}

/// Log progress in steps of ten percent.
fn progress_logger() -> Box<tessera_renderer::ProgressCallback> {
    let last_step = AtomicU32::new(0);
    Box::new(move |progress, done| {
        let step = (progress * 10.0).floor() as u32;
        if last_step.fetch_max(step, Ordering::Relaxed) < step {
            log::info!("Progress: {:.0}%", progress * 100.0);
        }
        if done {
            log::info!("Progress: done");
        }
    })
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;

    let scene = {
        log::info!("Loading scene");
        let _indent = tessera_core::LogIndenter::new();
        Scene::load(&config).context("Failed to build the scene")?
    };
    log::info!("Scene has {} triangles", scene.num_triangles());

    let start = Instant::now();
    let output = tessera_renderer::render(&config, &scene, Some(progress_logger()))
        .context("Rendering failed")?;
    log::info!(
        "Rendered {} samples in {:.2}s",
        output.processed_samples,
        start.elapsed().as_secs_f64()
    );

    save(&output.film, &args.output)
}

fn save(film: &tessera_core::Film, path: &Path) -> Result<()> {
    log::info!("Saving image to '{}'", path.display());
    film.save(path)
        .with_context(|| format!("Failed to save '{}'", path.display()))
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);

    if let Err(err) = run(&args) {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
