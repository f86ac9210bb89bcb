//! # scrollreel
//!
//! Renders a tall RGBA bitmap as a vertically scrolling video: given a
//! pre-rendered source image and a [`config::RenderConfig`], produces an
//! ordered, gap-free sequence of fixed-size frames windowed at a precisely
//! advancing vertical offset, composited against an opaque or transparent
//! background, and streamed to an `ffmpeg` child process over its stdin
//! pipe.
//!
//! ## Pipeline
//!
//! - [`source::SourceImage`] — the immutable RGBA raster frames are
//!   windowed from.
//! - [`scheduler::ScrollPlan`] (C3) — maps a frame index to a scroll
//!   position and a phase (head-static / scrolling / tail-static /
//!   past-end).
//! - [`compositor`] (C1) — the hot alpha-blending inner loop.
//! - [`frame`] (C2) — turns a frame index into a windowed, composited
//!   frame buffer.
//! - [`pool::WorkerPool`] (C4) — produces frames out of order across a
//!   fixed thread pool sharing the read-only source bitmap.
//! - [`streamer`] (C5) — reassembles frames in strict index order and
//!   writes them to the encoder's stdin.
//! - [`encoder`] (C6) — spawns and supervises the `ffmpeg` child process,
//!   including the stall/exit watchdog and the GPU-to-CPU fallback retry.
//! - [`progress::RenderStats`] (C7) — phase timings, throughput, ETA.
//!
//! [`render`] is the single entry point wiring all of the above together;
//! everything else is public so callers (and tests) can exercise a single
//! stage in isolation.

pub mod compositor;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod pool;
pub mod progress;
pub mod scheduler;
pub mod source;
pub mod streamer;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use config::RenderConfig;
use encoder::{EncoderBackend, EncoderProcess, ENCODE_WAIT_TIMEOUT, STALL_TIMEOUT, TERMINATE_GRACE};
use error::{RenderError, RenderResult};
use progress::RenderStats;
use scheduler::ScrollPlan;
use source::SourceImage;

/// Runs the full scrolling-frame pipeline end to end.
///
/// Validates `config` and `source` before touching any child process
/// (`ConfigError`/`SourceError`, per spec.md §7, never leave partial
/// output behind), plans the schedule, picks an encoder backend, and
/// drives frame production → ordered streaming → encoder wait.
///
/// On an `EncoderExitError` from a hardware-accelerated backend, retries
/// the entire render exactly once with the software fallback
/// (spec.md §4.6) — frame production is cheap to redo because
/// `ScrollPlan::position` is a pure function of the frame index, so no
/// frame buffering across the retry boundary is needed.
pub fn render(config: &RenderConfig, source: SourceImage) -> RenderResult<RenderStats> {
    config.validate()?;
    source.validate_against(config.video.height)?;

    let source = Arc::new(source);
    let plan = Arc::new(ScrollPlan::new(
        source.height(),
        config.video.height,
        config.video.fps,
        config.video.scroll_speed_px_per_frame,
        config.scroll_mode,
    ));

    let primary_backend = EncoderBackend::select(&config.video, config.prefer_gpu);

    match render_attempt(config, &source, &plan, primary_backend) {
        Ok(stats) => Ok(stats),
        Err(primary_err @ RenderError::EncoderExit { .. }) => match primary_backend.software_fallback() {
            Some(fallback) => render_attempt(config, &source, &plan, fallback)
                .map_err(|retry_err| retry_err.with_context(format!("software fallback also failed; hardware attempt: {primary_err}"))),
            None => Err(primary_err),
        },
        Err(err) => Err(err),
    }
}

/// One end-to-end attempt with a fixed `backend`: spawn the encoder,
/// produce every frame in parallel, stream them in order, and wait for
/// exit. Returns whichever `RenderError` kind the failure corresponds to;
/// `render` is the only place that decides whether to retry.
fn render_attempt(
    config: &RenderConfig,
    source: &Arc<SourceImage>,
    plan: &Arc<ScrollPlan>,
    backend: EncoderBackend,
) -> RenderResult<RenderStats> {
    let n_total = plan.n_total();
    let worker_count = config.resolved_worker_count();
    let params = Arc::new(config.video.clone());

    let mut stats = RenderStats::new(n_total);
    let abort = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));
    let stalled = Arc::new(AtomicBool::new(false));

    let mut encoder_process = EncoderProcess::spawn(&config.video, config.encoder_preset, backend)?;
    stats.mark_preparation_done();

    let mut stdin = encoder_process.take_stdin().ok_or_else(|| {
        RenderError::encoder_spawn("ffmpeg", std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin not available"))
    })?;

    let (pool_handle, results) =
        pool::WorkerPool::spawn(n_total, worker_count, Arc::clone(source), Arc::clone(&params), Arc::clone(plan), Arc::clone(&abort));

    let watchdog = encoder::spawn_watchdog(
        encoder_process.child_handle(),
        Arc::clone(&stats.frames_emitted),
        Arc::clone(&done),
        Arc::clone(&abort),
        Arc::clone(&stalled),
    );

    stats.mark_frame_processing_start();
    let stream_result = streamer::stream_frames(&results, &mut stdin, n_total, &abort, |i| stats.on_frame_written(i));
    stats.mark_frame_processing_done();

    done.store(true, Ordering::Relaxed);
    let _ = watchdog.join();
    drop(stdin);
    pool_handle.join();

    if stalled.load(Ordering::Relaxed) {
        encoder_process.join_drains();
        return Err(RenderError::timeout("frame_processing", STALL_TIMEOUT.as_secs()));
    }

    let written = match stream_result {
        Ok(written) => written,
        Err(pipe_err) if pipe_err.category() == "pipe" => {
            // A broken pipe means the encoder already exited (the
            // canonical case is a hardware encoder dying mid-stream, the
            // one §4.6's fallback exists for); reap it and report the
            // real exit code + stderr tail as an EncoderExit rather than
            // the bare pipe error, per spec.md §7 ("PipeError ... always
            // paired with an encoder exit and reported as such"). This is
            // also what lets `render`'s GPU->CPU fallback engage, since
            // it only retries on `EncoderExit`.
            abort.store(true, Ordering::Relaxed);
            let status = match encoder_process.wait_timeout(TERMINATE_GRACE)? {
                Some(status) => Some(status),
                None => {
                    encoder_process.terminate();
                    encoder_process.wait_timeout(TERMINATE_GRACE)?
                }
            };
            encoder_process.join_drains();
            return Err(RenderError::encoder_exit(status.and_then(|s| s.code()), encoder_process.stderr_tail()));
        }
        Err(other_err) => {
            encoder_process.join_drains();
            return Err(other_err);
        }
    };
    if written < n_total {
        abort.store(true, Ordering::Relaxed);
        encoder_process.terminate();
        encoder_process.join_drains();
        return Err(RenderError::worker(written, "result channel closed before every frame was produced"));
    }

    stats.mark_encoding_start();
    let status = match encoder_process.wait_timeout(ENCODE_WAIT_TIMEOUT)? {
        Some(status) => status,
        None => {
            encoder_process.terminate();
            if encoder_process.wait_timeout(TERMINATE_GRACE)?.is_none() {
                encoder_process.kill();
            }
            encoder_process.join_drains();
            return Err(RenderError::timeout("encoder_wait", ENCODE_WAIT_TIMEOUT.as_secs()));
        }
    };
    encoder_process.join_drains();
    stats.mark_encoding_done();

    if !status.success() {
        return Err(RenderError::encoder_exit(status.code(), encoder_process.stderr_tail()));
    }

    eprintln!();
    eprint!("{}", stats.summary());
    Ok(stats)
}
