//! Scroll scheduler (C3): maps a frame index to a scroll position and a
//! phase, and decides the total frame count for a render.

use crate::config::ScrollMode;

/// Which region of the clip a frame index falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Viewport shows the top of the source, motionless (padded mode only).
    HeadStatic,
    /// Viewport is actively sliding down the source.
    Scrolling,
    /// Viewport shows the source's final position, motionless (padded mode
    /// only).
    TailStatic,
    /// `i >= N_total`; no frame should be emitted.
    PastEnd,
}

/// A fully planned schedule: total frame count plus a position for every
/// index in `[0, N_total)`.
///
/// Positions are precomputed once via running accumulation (`acc += v`,
/// never `i * v`) at construction time and cached, so `position(i)` is a
/// cheap, pure lookup any worker thread can call concurrently — the
/// accumulation happens exactly once, up front, rather than once per call.
#[derive(Debug)]
pub struct ScrollPlan {
    mode: ScrollMode,
    h_img: u32,
    h_video: u32,
    n_total: u64,
    n_head: u64,
    n_scroll: u64,
    positions: Vec<f64>,
}

impl ScrollPlan {
    /// Plans a schedule for a source of height `h_img`, a viewport of height
    /// `h_video`, and the given frame rate / scroll speed / mode.
    ///
    /// `v` is assumed to already satisfy `v >= MIN_SCROLL_SPEED`; validating
    /// that is `RenderConfig::validate`'s job, not this constructor's.
    pub fn new(h_img: u32, h_video: u32, fps: u32, v: f64, mode: ScrollMode) -> Self {
        match mode {
            ScrollMode::Pure => Self::plan_pure(h_img, h_video, v, mode),
            ScrollMode::Padded { head_static_secs, tail_static_secs } => {
                Self::plan_padded(h_img, h_video, fps, v, head_static_secs, tail_static_secs, mode)
            }
        }
    }

    fn plan_pure(h_img: u32, h_video: u32, v: f64, mode: ScrollMode) -> Self {
        let n_total = (h_img as f64 / v).ceil() as u64;
        let positions = accumulate(n_total, v);
        Self {
            mode,
            h_img,
            h_video,
            n_total,
            n_head: 0,
            n_scroll: n_total,
            positions,
        }
    }

    fn plan_padded(
        h_img: u32,
        h_video: u32,
        fps: u32,
        v: f64,
        head_static_secs: f64,
        tail_static_secs: f64,
        mode: ScrollMode,
    ) -> Self {
        let n_head = (head_static_secs * fps as f64).ceil() as u64;
        let scroll_span = (h_img.saturating_sub(h_video)) as f64;
        let n_scroll = (scroll_span / v).ceil() as u64;
        let n_tail = (tail_static_secs * fps as f64).ceil() as u64;
        let n_total = n_head + n_scroll + n_tail;

        // Positions during the scroll phase are accumulated independently
        // of the head offset, then looked up with an index shift in
        // `position()` — the accumulation itself never multiplies.
        let scroll_positions = accumulate(n_scroll, v);

        Self {
            mode,
            h_img,
            h_video,
            n_total,
            n_head,
            n_scroll,
            positions: scroll_positions,
        }
    }

    /// Total number of frames this plan emits.
    pub fn n_total(&self) -> u64 {
        self.n_total
    }

    /// Classifies which region frame `i` falls in.
    pub fn phase(&self, i: u64) -> Phase {
        if i >= self.n_total {
            return Phase::PastEnd;
        }
        match self.mode {
            ScrollMode::Pure => Phase::Scrolling,
            ScrollMode::Padded { .. } => {
                if i < self.n_head {
                    Phase::HeadStatic
                } else if i < self.n_head + self.n_scroll {
                    Phase::Scrolling
                } else {
                    Phase::TailStatic
                }
            }
        }
    }

    /// The scroll position `p_i` for frame `i`, per the phase classification.
    ///
    /// Head frames report `0`; tail frames report `H_img - H_video` clamped
    /// to `>= 0`; scroll frames come from the precomputed accumulation.
    /// Callers past `N_total` get the tail/end position — the frame builder
    /// is responsible for not emitting a frame at all once `phase(i)` is
    /// `PastEnd`.
    pub fn position(&self, i: u64) -> f64 {
        match self.phase(i) {
            Phase::HeadStatic => 0.0,
            Phase::Scrolling => {
                let scroll_index = i - self.n_head;
                self.positions[scroll_index as usize]
            }
            Phase::TailStatic | Phase::PastEnd => {
                (self.h_img as f64 - self.h_video as f64).max(0.0)
            }
        }
    }
}

/// Produces `count` positions `[p_0, p_1, ..., p_{count-1}]` via running
/// accumulation: `p_0 = 0`, `p_i = p_{i-1} + v`. This is the literal rule
/// from the data model — never computed as `i as f64 * v`.
fn accumulate(count: u64, v: f64) -> Vec<f64> {
    let mut positions = Vec::with_capacity(count as usize);
    let mut acc = 0.0;
    for _ in 0..count {
        positions.push(acc);
        acc += v;
    }
    positions
}
