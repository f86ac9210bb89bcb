//! Parallel worker pool (C4): produces frames out of order across a fixed
//! number of threads sharing a read-only [`SourceImage`], batching frame
//! indices to amortize dispatch overhead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, bounded};

use crate::config::VideoParams;
use crate::frame::{self, Frame};
use crate::scheduler::ScrollPlan;
use crate::source::SourceImage;

/// Frame indices handed to a worker in one unit: `[start, end)`.
const DEFAULT_BATCH_SIZE: u64 = 12;

#[derive(Debug, Clone, Copy)]
struct Batch {
    start: u64,
    end: u64,
}

/// A running pool: a submission thread feeding batches and `worker_count`
/// threads consuming them, all joined together by [`WorkerPool::join`].
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts the pool. Returns the pool handle (for [`join`](Self::join))
    /// and the bounded result channel the caller should drain in order
    /// (see `streamer::stream_frames`).
    ///
    /// `source`, `params`, and `plan` are never mutated after this call;
    /// every worker holds its own `Arc` clone, so no per-frame copying of
    /// the source bitmap occurs (spec.md §4.4, realization (b)).
    pub fn spawn(
        n_total: u64,
        worker_count: usize,
        source: Arc<SourceImage>,
        params: Arc<VideoParams>,
        plan: Arc<ScrollPlan>,
        abort: Arc<AtomicBool>,
    ) -> (Self, Receiver<(u64, Frame)>) {
        let batch_size = DEFAULT_BATCH_SIZE;
        let (job_tx, job_rx) = bounded::<Batch>(worker_count * 2);
        // Bounded so a slow streamer applies backpressure to every worker,
        // not just the one that happens to be ahead (spec.md §9). Same
        // `pool_size * batch_size * 2` bound the streamer's own pending map
        // is sized to (see `streamer::max_pending`), so neither side can
        // silently grow past the other's backpressure point.
        let result_capacity = crate::streamer::max_pending(worker_count, batch_size as usize);
        let (result_tx, result_rx) = bounded::<(u64, Frame)>(result_capacity);

        let mut handles = Vec::with_capacity(worker_count + 1);

        {
            let abort = Arc::clone(&abort);
            handles.push(thread::spawn(move || {
                let mut start = 0u64;
                while start < n_total {
                    if abort.load(Ordering::Relaxed) {
                        break;
                    }
                    let end = (start + batch_size).min(n_total);
                    if job_tx.send(Batch { start, end }).is_err() {
                        break;
                    }
                    start = end;
                }
                // Dropping job_tx here closes the channel once submission
                // is done (or stops early on abort), which is what lets
                // worker threads' `recv()` loops terminate below.
            }));
        }

        for _ in 0..worker_count {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let source = Arc::clone(&source);
            let params = Arc::clone(&params);
            let plan = Arc::clone(&plan);
            let abort = Arc::clone(&abort);
            handles.push(thread::spawn(move || {
                while let Ok(batch) = job_rx.recv() {
                    for i in batch.start..batch.end {
                        // Checked between frames and between batches, per
                        // spec.md §4.4: an in-flight batch is abandoned
                        // rather than finished once abort is observed.
                        if abort.load(Ordering::Relaxed) {
                            return;
                        }
                        let built = frame::build_frame(i, &source, &params, &plan);
                        if result_tx.send((i, built)).is_err() {
                            return;
                        }
                    }
                }
            }));
        }

        (Self { handles }, result_rx)
    }

    /// Joins every submission/worker thread. Never returns an error: a
    /// panicked worker surfaces through the `WorkerError` the orchestrator
    /// raises when the result channel closes early, not through this call.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScrollMode, VideoParams};
    use image::RgbaImage;

    fn make_source(width: u32, height: u32) -> Arc<SourceImage> {
        let mut img = RgbaImage::new(width, height);
        for (i, pixel) in img.pixels_mut().enumerate() {
            pixel.0 = [(i % 256) as u8, 0, 0, 255];
        }
        Arc::new(SourceImage::new(img))
    }

    fn make_params() -> Arc<VideoParams> {
        Arc::new(VideoParams {
            width: 16,
            height: 16,
            fps: 10,
            scroll_speed_px_per_frame: 2.0,
            bg_rgba: [255, 255, 255, 255],
            transparent: false,
            audio_path: None,
            output_path: "out.mp4".into(),
        })
    }

    #[test]
    fn produces_every_index_exactly_once() {
        let source = make_source(16, 96);
        let params = make_params();
        let plan = Arc::new(ScrollPlan::new(96, 16, 10, 2.0, ScrollMode::Pure));
        let n_total = plan.n_total();
        let abort = Arc::new(AtomicBool::new(false));

        let (pool, results) = WorkerPool::spawn(n_total, 3, source, params, plan, abort);

        let mut seen = vec![false; n_total as usize];
        for _ in 0..n_total {
            let (i, _frame) = results.recv().expect("worker produced a frame");
            assert!(!seen[i as usize], "index {i} produced twice");
            seen[i as usize] = true;
        }
        pool.join();
        assert!(seen.iter().all(|&s| s), "every index must be produced exactly once");
    }

    #[test]
    fn abort_stops_production_without_hanging() {
        let source = make_source(16, 10_000);
        let params = make_params();
        let plan = Arc::new(ScrollPlan::new(10_000, 16, 10, 2.0, ScrollMode::Pure));
        let n_total = plan.n_total();
        let abort = Arc::new(AtomicBool::new(false));

        let (pool, results) = WorkerPool::spawn(n_total, 4, source, params, plan, Arc::clone(&abort));
        // Consume a handful of frames, then abort; the pool must still
        // terminate instead of workers blocking forever on a full result
        // channel or a closed job channel.
        for _ in 0..5 {
            let _ = results.recv().unwrap();
        }
        abort.store(true, Ordering::Relaxed);
        while results.recv().is_ok() {}
        pool.join();
    }
}
