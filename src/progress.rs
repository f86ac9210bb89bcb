//! Progress & metrics (C7): phase timestamps, throughput, and ETA,
//! reported as a rate-limited progress line during the render and a
//! summary table at completion.
//!
//! Grounded on `original_source/.../renderer/video_renderer.py`'s
//! `performance_stats` dict (preparation/frame-processing/encoding phase
//! timings, frames processed, mean fps) and its formatted completion
//! report; the ≤2Hz rate limit on the live line is this crate's own
//! addition, since the pipeline streams thousands of frames a render.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Minimum spacing between progress-line prints to stderr.
const REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// Shared, lock-free frame counter plus the phase timestamps recorded by
/// the orchestrator as each stage starts and ends. Cheap to clone: only
/// the counter is behind an `Arc`, the timestamps are plain `Option<Instant>`
/// set by a single owner (the orchestrating thread), never contended.
pub struct RenderStats {
    pub n_total: u64,
    pub frames_emitted: Arc<AtomicU64>,
    preparation_start: Instant,
    preparation_end: Option<Instant>,
    frame_processing_start: Option<Instant>,
    frame_processing_end: Option<Instant>,
    encoding_start: Option<Instant>,
    encoding_end: Option<Instant>,
    last_report: Option<Instant>,
}

impl RenderStats {
    pub fn new(n_total: u64) -> Self {
        Self {
            n_total,
            frames_emitted: Arc::new(AtomicU64::new(0)),
            preparation_start: Instant::now(),
            preparation_end: None,
            frame_processing_start: None,
            frame_processing_end: None,
            encoding_start: None,
            encoding_end: None,
            last_report: None,
        }
    }

    pub fn mark_preparation_done(&mut self) {
        self.preparation_end = Some(Instant::now());
    }

    pub fn mark_frame_processing_start(&mut self) {
        self.frame_processing_start = Some(Instant::now());
    }

    pub fn mark_frame_processing_done(&mut self) {
        self.frame_processing_end = Some(Instant::now());
    }

    pub fn mark_encoding_start(&mut self) {
        self.encoding_start = Some(Instant::now());
    }

    pub fn mark_encoding_done(&mut self) {
        self.encoding_end = Some(Instant::now());
    }

    /// Called once per frame written to the sink. Prints a rate-limited
    /// progress line to stderr; does nothing if less than
    /// [`REPORT_INTERVAL`] has elapsed since the last print.
    pub fn on_frame_written(&mut self, index: u64) {
        self.frames_emitted.store(index + 1, Ordering::Relaxed);

        let now = Instant::now();
        if let Some(last) = self.last_report {
            if now.duration_since(last) < REPORT_INTERVAL {
                return;
            }
        }
        self.last_report = Some(now);
        eprint!("\r{}", self.progress_line(index + 1));
    }

    fn progress_line(&self, emitted: u64) -> String {
        let elapsed = self.frame_processing_start.map(|s| s.elapsed().as_secs_f64()).unwrap_or(0.0);
        let fps = if elapsed > 0.0 { emitted as f64 / elapsed } else { 0.0 };
        let remaining = self.n_total.saturating_sub(emitted);
        let eta = if fps > 0.0 { remaining as f64 / fps } else { f64::INFINITY };
        format!(
            "frame {emitted}/{} ({:.1} fps, eta {})",
            self.n_total,
            fps,
            format_duration(eta),
        )
    }

    /// Mean frames-per-second across the frame-processing phase. `None`
    /// until that phase has both started and ended.
    pub fn mean_fps(&self) -> Option<f64> {
        let start = self.frame_processing_start?;
        let end = self.frame_processing_end?;
        let elapsed = end.duration_since(start).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some(self.frames_emitted.load(Ordering::Relaxed) as f64 / elapsed)
    }

    /// A final, multi-line summary table: one line per phase plus totals,
    /// matching the original renderer's completion report.
    pub fn summary(&self) -> String {
        let prep = self
            .preparation_end
            .map(|e| e.duration_since(self.preparation_start).as_secs_f64())
            .unwrap_or(0.0);
        let processing = match (self.frame_processing_start, self.frame_processing_end) {
            (Some(s), Some(e)) => e.duration_since(s).as_secs_f64(),
            _ => 0.0,
        };
        let encoding = match (self.encoding_start, self.encoding_end) {
            (Some(s), Some(e)) => e.duration_since(s).as_secs_f64(),
            _ => 0.0,
        };
        let total = prep + processing + encoding;
        let fps = self.mean_fps().unwrap_or(0.0);

        format!(
            "render summary\n\
             --------------\n\
             1. preparation:       {prep:.2}s\n\
             2. frame processing:  {processing:.2}s ({fps:.2} fps)\n\
             3. encoding:          {encoding:.2}s\n\
             total:                {total:.2}s, {} frames\n",
            self.frames_emitted.load(Ordering::Relaxed),
        )
    }
}

fn format_duration(secs: f64) -> String {
    if !secs.is_finite() {
        return "--:--".into();
    }
    let secs = secs.round() as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_fps_is_none_before_phase_completes() {
        let stats = RenderStats::new(100);
        assert!(stats.mean_fps().is_none());
    }

    #[test]
    fn mean_fps_reflects_elapsed_time_and_frame_count() {
        let mut stats = RenderStats::new(100);
        stats.mark_frame_processing_start();
        stats.frames_emitted.store(50, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(10));
        stats.mark_frame_processing_done();
        let fps = stats.mean_fps().unwrap();
        assert!(fps > 0.0);
    }

    #[test]
    fn summary_reports_total_frames_emitted() {
        let mut stats = RenderStats::new(10);
        stats.mark_preparation_done();
        stats.mark_frame_processing_start();
        stats.frames_emitted.store(10, Ordering::Relaxed);
        stats.mark_frame_processing_done();
        stats.mark_encoding_start();
        stats.mark_encoding_done();
        let summary = stats.summary();
        assert!(summary.contains("10 frames"));
    }

    #[test]
    fn format_duration_handles_infinite_eta() {
        assert_eq!(format_duration(f64::INFINITY), "--:--");
        assert_eq!(format_duration(65.0), "01:05");
    }
}
