//! Block scheduler driving the per-thread render processes.
//!
//! The sample budget is cut into blocks of `samples_per_block` samples.
//! Blocks are handed to a rayon pool in passes of one block per process;
//! the `i`-th block of a pass always goes to process `i`, so the samples
//! each process draws do not depend on thread timing. Between passes the
//! scheduler may write a progress snapshot. When sampling ends the films
//! are summed into a master film and rescaled by `W * H / N`.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use rayon::prelude::*;
use tessera_core::{ConfigNode, Film, Scene};

use crate::{ProgressCallback, RenderError, RenderProcess, RenderResult, Renderer};

/// Final image of a render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub film: Film,
    /// Number of samples that were actually processed.
    pub processed_samples: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerminationMode {
    /// Stop after `num_samples` samples.
    Samples,
    /// Stop once the wall-clock budget in seconds is spent.
    Time(f64),
}

pub struct RenderScheduler {
    num_samples: u64,
    num_threads: usize,
    samples_per_block: u64,
    termination: TerminationMode,
    /// Seconds between progress snapshots; disabled when not positive.
    progress_image_interval: f64,
    progress_image_dir: Option<PathBuf>,
    progress: Box<ProgressCallback>,
}

impl std::fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderScheduler")
            .field("num_samples", &self.num_samples)
            .field("num_threads", &self.num_threads)
            .field("samples_per_block", &self.samples_per_block)
            .field("termination", &self.termination)
            .field("progress_image_interval", &self.progress_image_interval)
            .finish()
    }
}

impl RenderScheduler {
    /// Read the scheduler options.
    ///
    /// `num_threads <= 0` means the number of hardware threads plus the
    /// given value (at least one thread). Setting `render_time` switches to
    /// time-based termination.
    pub fn configure(node: &ConfigNode<'_>) -> RenderResult<Self> {
        let num_samples: u64 = node.child_value_or_default("num_samples", 1)?;

        let num_threads: i64 = node.child_value_or_default("num_threads", 0)?;
        let num_threads = if num_threads <= 0 {
            let hardware = std::thread::available_parallelism()
                .map(|n| n.get() as i64)
                .unwrap_or(1);
            (hardware + num_threads).max(1) as usize
        } else {
            num_threads as usize
        };

        let samples_per_block: i64 = node.child_value_or_default("samples_per_block", 100)?;
        if samples_per_block <= 0 {
            log::error!("'samples_per_block' must be positive");
            return Err(RenderError::Invalid(format!(
                "samples_per_block = {}",
                samples_per_block
            )));
        }

        let termination = match node.child("render_time") {
            Some(n) => {
                let seconds: f32 = n.parse()?;
                if seconds <= 0.0 {
                    log::error!("'render_time' must be positive");
                    return Err(RenderError::Invalid(format!("render_time = {}", seconds)));
                }
                TerminationMode::Time(seconds as f64)
            }
            None => TerminationMode::Samples,
        };

        let progress_image_interval: f32 =
            node.child_value_or_default("progress_image_interval", -1.0)?;
        let progress_image_dir = node
            .child("progress_image_dir")
            .map(|n| n.parse::<String>())
            .transpose()?
            .map(PathBuf::from);

        log::info!(
            "Scheduler: {} thread(s), {} sample(s) per block",
            num_threads,
            samples_per_block
        );

        Ok(Self {
            num_samples,
            num_threads,
            samples_per_block: samples_per_block as u64,
            termination,
            progress_image_interval: progress_image_interval as f64,
            progress_image_dir,
            progress: Box::new(|_, _| {}),
        })
    }

    pub fn set_progress_callback(&mut self, progress: Box<ProgressCallback>) {
        self.progress = progress;
    }

    pub fn progress_callback(&self) -> &ProgressCallback {
        &*self.progress
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn termination(&self) -> TerminationMode {
        self.termination
    }

    fn num_blocks(&self) -> u64 {
        self.num_samples.div_ceil(self.samples_per_block)
    }

    /// Sample range `[begin, end)` of a block.
    fn block_range(&self, block: u64) -> (u64, u64) {
        let begin = block * self.samples_per_block;
        let end = begin + self.samples_per_block;
        match self.termination {
            TerminationMode::Samples => (begin, end.min(self.num_samples)),
            TerminationMode::Time(_) => (begin, end),
        }
    }

    /// Sample `scene` with `renderer` until the termination criterion holds.
    ///
    /// A panic inside a worker stops the render; the blocks in flight are
    /// drained and [`RenderError::Cancelled`] is returned.
    pub fn render(&self, renderer: &dyn Renderer, scene: &Scene) -> RenderResult<RenderOutput> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .thread_name(|i| format!("render-{}", i))
            .build()
            .map_err(|e| RenderError::ThreadPool(e.to_string()))?;

        let processes = (0..self.num_threads)
            .map(|thread_id| {
                renderer
                    .create_render_process(scene, thread_id, self.num_threads)
                    .map(Mutex::new)
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let processed = AtomicU64::new(0);
        let done = AtomicBool::new(false);
        let cancelled = AtomicBool::new(false);
        let start = Instant::now();
        let mut last_snapshot = Instant::now();
        let mut snapshot_index = 0usize;
        let num_blocks = self.num_blocks();
        let mut next_block = 0u64;

        loop {
            let pass_begin = next_block;
            let pass_end = match self.termination {
                TerminationMode::Samples => (pass_begin + self.num_threads as u64).min(num_blocks),
                TerminationMode::Time(_) => pass_begin + self.num_threads as u64,
            };
            if pass_begin >= pass_end {
                break;
            }

            pool.install(|| {
                (pass_begin..pass_end).into_par_iter().for_each(|block| {
                    if done.load(Ordering::Relaxed) {
                        return;
                    }
                    let process_id = (block - pass_begin) as usize;
                    let (begin, end) = self.block_range(block);

                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        let mut process = processes[process_id]
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner);
                        for _ in begin..end {
                            process.process_single_sample();
                        }
                    }));
                    if result.is_err() {
                        log::error!("EXCEPTION (process #{})", process_id);
                        cancelled.store(true, Ordering::Relaxed);
                        done.store(true, Ordering::Relaxed);
                        return;
                    }

                    let total = processed.fetch_add(end - begin, Ordering::Relaxed) + (end - begin);
                    match self.termination {
                        TerminationMode::Samples => {
                            (self.progress)(total as f64 / self.num_samples as f64, false);
                        }
                        TerminationMode::Time(limit) => {
                            let elapsed = start.elapsed().as_secs_f64();
                            if elapsed > limit {
                                done.store(true, Ordering::Relaxed);
                            } else {
                                (self.progress)(elapsed / limit, false);
                            }
                        }
                    }
                });
            });
            next_block = pass_end;

            if self.progress_image_interval > 0.0
                && last_snapshot.elapsed().as_secs_f64() > self.progress_image_interval
            {
                last_snapshot = Instant::now();
                self.write_progress_image(
                    renderer,
                    scene,
                    &processes,
                    processed.load(Ordering::Relaxed),
                    snapshot_index,
                );
                snapshot_index += 1;
            }

            if done.load(Ordering::Relaxed) {
                break;
            }
        }

        (self.progress)(1.0, true);

        if cancelled.load(Ordering::Relaxed) {
            return Err(RenderError::Cancelled);
        }

        let processed_samples = processed.load(Ordering::Relaxed);
        let film = merge_films(scene, &processes, processed_samples)?;
        log::info!(
            "Rendering completed in {:.3} seconds",
            start.elapsed().as_secs_f64()
        );
        log::info!("Processed # of samples : {}", processed_samples);

        Ok(RenderOutput {
            film,
            processed_samples,
        })
    }

    fn write_progress_image(
        &self,
        renderer: &dyn Renderer,
        scene: &Scene,
        processes: &[Mutex<Box<dyn RenderProcess + '_>>],
        processed: u64,
        index: usize,
    ) {
        let dir = self
            .progress_image_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("progress.{}", renderer.type_name())));
        if let Err(e) = std::fs::create_dir_all(&dir) {
            log::warn!("Failed to create progress image directory {}: {}", dir.display(), e);
            return;
        }

        let path = dir.join(format!("{:010}.hdr", index));
        match merge_films(scene, processes, processed) {
            Ok(film) => match film.save(&path) {
                Ok(()) => log::info!("Saved progress image: {}", path.display()),
                Err(e) => log::warn!("Failed to save progress image {}: {}", path.display(), e),
            },
            Err(e) => log::warn!("Failed to merge progress films: {}", e),
        }
    }
}

/// Sum of the process films, rescaled to an estimate per pixel.
fn merge_films(
    scene: &Scene,
    processes: &[Mutex<Box<dyn RenderProcess + '_>>],
    processed: u64,
) -> RenderResult<Film> {
    let mut film = scene.main_camera().film().clone_empty();
    for process in processes {
        let process = process.lock().unwrap_or_else(PoisonError::into_inner);
        film.accumulate(process.film())?;
    }
    if processed > 0 {
        film.rescale((film.width() * film.height()) as f32 / processed as f32);
    }
    Ok(film)
}
