//! # Configuration
//!
//! This module defines the parameters the render pipeline runs with and the
//! single place those parameters are validated.
//!
//! ## Overview
//!
//! - [`VideoParams`] is the immutable record described by the data model:
//!   resolution, frame rate, scroll speed, background color, transparency,
//!   optional audio, and output path.
//! - [`ScrollMode`] selects between the two coexisting frame-count
//!   conventions (pure scroll vs head/scroll/tail padded).
//! - [`EncoderPreset`] maps a coarse quality choice to concrete encoder
//!   arguments so the CLI doesn't need to expose raw CRF values.
//! - [`RenderConfig`] bundles all of the above plus pipeline-level knobs
//!   (worker count override, GPU preference) and is the only type
//!   `validate()` is called on.
//!
//! ## Examples
//!
//! ```rust
//! use scrollreel::config::{RenderConfig, VideoParams, ScrollMode};
//!
//! let params = VideoParams {
//!     width: 640,
//!     height: 360,
//!     fps: 30,
//!     scroll_speed_px_per_frame: 2.0,
//!     bg_rgba: [255, 255, 255, 255],
//!     transparent: false,
//!     audio_path: None,
//!     output_path: "out.mp4".into(),
//! };
//!
//! let config = RenderConfig::new(params, ScrollMode::Pure);
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;

use crate::error::{RenderError, RenderResult};

/// Minimum scroll speed the scheduler accepts, in pixels per frame.
///
/// Below this the floor-indexed row position barely advances between
/// frames and the output is indistinguishable from a freeze; the scheduler
/// raises a config error rather than silently producing a near-static video.
pub const MIN_SCROLL_SPEED: f64 = 0.5;

/// Default static hold, in seconds, at the head and tail of padded mode.
pub const DEFAULT_STATIC_HOLD_SECS: f64 = 3.0;

/// Immutable record of the parameters a single render runs with.
///
/// Matches the `VideoParams` data model directly: resolution, frame rate,
/// scroll speed (pixels per frame, never pixels per second — see
/// `SPEC_FULL.md` §9), background color, transparency flag, optional audio
/// track, and output path.
#[derive(Debug, Clone)]
pub struct VideoParams {
    /// Output frame width in pixels. Must be > 0.
    pub width: u32,
    /// Output frame height in pixels (the viewport height `H_video`). Must
    /// be > 0 and no greater than the source image's height.
    pub height: u32,
    /// Frames per second. Must be > 0.
    pub fps: u32,
    /// Scroll speed in pixels per frame. Must be >= [`MIN_SCROLL_SPEED`].
    pub scroll_speed_px_per_frame: f64,
    /// Background color used to fill rows outside the source window.
    /// When `transparent` is set, only the alpha channel of this color is
    /// honored for padding rows.
    pub bg_rgba: [u8; 4],
    /// When true, frames are emitted as RGBA (`C = 4`) and the compositor's
    /// opaque blending path is skipped. When false, frames are RGB
    /// (`C = 3`) and every row is alpha-composited against `bg_rgba`.
    pub transparent: bool,
    /// Optional audio track muxed into the output via `-shortest`.
    pub audio_path: Option<PathBuf>,
    /// Where the encoder writes the final container.
    pub output_path: PathBuf,
}

/// Which of the two coexisting frame-count conventions the scheduler uses.
///
/// The source material contains both; this crate picks one per render via
/// this enum rather than silently resizing `N_total` mid-run (`SPEC_FULL.md`
/// §9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollMode {
    /// `N_total = ceil(H_img / v)`, no static padding.
    Pure,
    /// Static hold at the head and tail of the clip, scrolling in between.
    Padded {
        head_static_secs: f64,
        tail_static_secs: f64,
    },
}

impl ScrollMode {
    /// Padded mode with the default 3-second head and tail hold, matching
    /// the original renderer's `start_static_time` / `end_static_time`.
    pub fn padded_default() -> Self {
        Self::Padded {
            head_static_secs: DEFAULT_STATIC_HOLD_SECS,
            tail_static_secs: DEFAULT_STATIC_HOLD_SECS,
        }
    }
}

/// Coarse quality choice exposed at the CLI boundary, mapped to a concrete
/// CRF/preset pair so callers don't need to know libx264 internals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncoderPreset {
    Fast,
    Balanced,
    Quality,
}

impl EncoderPreset {
    /// `(x264 preset, crf)` pair used by the CPU opaque encode path.
    pub fn x264_args(self) -> (&'static str, u8) {
        match self {
            Self::Fast => ("veryfast", 23),
            Self::Balanced => ("medium", 20),
            Self::Quality => ("slow", 18),
        }
    }
}

/// The fully-resolved, validated parameter set the pipeline runs with.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub video: VideoParams,
    pub scroll_mode: ScrollMode,
    /// Overrides the `max(2, min(cpu_count - 1, 8))` default worker count.
    /// Tests pin this to get reproducible interleavings without weakening
    /// the reorder-correctness property, which must hold at any worker count.
    pub worker_count: Option<usize>,
    pub encoder_preset: EncoderPreset,
    /// Whether to attempt a hardware encoder before the software fallback.
    /// Defaults to `false`: GPU availability can't be verified from inside
    /// the library, so the crate only opts in when the caller asks.
    pub prefer_gpu: bool,
}

impl RenderConfig {
    /// Builds a config with the given video parameters and scroll mode,
    /// using the default worker count, a `Balanced` encoder preset, and no
    /// GPU preference.
    pub fn new(video: VideoParams, scroll_mode: ScrollMode) -> Self {
        Self {
            video,
            scroll_mode,
            worker_count: None,
            encoder_preset: EncoderPreset::Balanced,
            prefer_gpu: false,
        }
    }

    /// Validates every field, returning the first violation found.
    ///
    /// Checks, in order: positive width/height/fps, minimum scroll speed,
    /// a readable audio path (if set), and a non-zero worker count override
    /// (if set). This is the only place a `ConfigError` is raised; callers
    /// can rely on construction + `validate()` happening before any child
    /// process is spawned.
    pub fn validate(&self) -> RenderResult<()> {
        let v = &self.video;

        if v.width == 0 {
            return Err(RenderError::config("width", "0", "must be greater than 0"));
        }
        if v.height == 0 {
            return Err(RenderError::config("height", "0", "must be greater than 0"));
        }
        if v.fps == 0 {
            return Err(RenderError::config("fps", "0", "must be greater than 0"));
        }
        if v.scroll_speed_px_per_frame < MIN_SCROLL_SPEED {
            return Err(RenderError::config(
                "scroll_speed_px_per_frame",
                v.scroll_speed_px_per_frame.to_string(),
                format!("must be >= {MIN_SCROLL_SPEED}"),
            ));
        }
        if let Some(path) = &v.audio_path {
            if !path.is_file() {
                return Err(RenderError::config(
                    "audio_path",
                    path.display().to_string(),
                    "file does not exist or is not readable",
                ));
            }
        }
        if let Some(0) = self.worker_count {
            return Err(RenderError::config(
                "worker_count",
                "0",
                "must be greater than 0 when overridden",
            ));
        }
        if let ScrollMode::Padded { head_static_secs, tail_static_secs } = self.scroll_mode {
            if head_static_secs < 0.0 || tail_static_secs < 0.0 {
                return Err(RenderError::config(
                    "scroll_mode",
                    format!("{head_static_secs},{tail_static_secs}"),
                    "static hold durations must be non-negative",
                ));
            }
        }

        Ok(())
    }

    /// Worker pool size: the override if set, otherwise
    /// `max(2, min(cpu_count - 1, 8))`.
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(|| {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4);
            (cpus.saturating_sub(1)).clamp(2, 8)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> VideoParams {
        VideoParams {
            width: 640,
            height: 360,
            fps: 30,
            scroll_speed_px_per_frame: 2.0,
            bg_rgba: [255, 255, 255, 255],
            transparent: false,
            audio_path: None,
            output_path: "out.mp4".into(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = RenderConfig::new(sample_params(), ScrollMode::Pure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_dimensions() {
        let mut params = sample_params();
        params.width = 0;
        let config = RenderConfig::new(params, ScrollMode::Pure);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_too_slow_scroll_speed() {
        let mut params = sample_params();
        params.scroll_speed_px_per_frame = 0.1;
        let config = RenderConfig::new(params, ScrollMode::Pure);
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn rejects_missing_audio_file() {
        let mut params = sample_params();
        params.audio_path = Some("/does/not/exist.wav".into());
        let config = RenderConfig::new(params, ScrollMode::Pure);
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_audio_path_that_exists_on_disk() {
        let audio = tempfile::NamedTempFile::new().expect("tempfile must create a file");
        let mut params = sample_params();
        params.audio_path = Some(audio.path().to_path_buf());
        let config = RenderConfig::new(params, ScrollMode::Pure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn worker_count_override_must_be_nonzero() {
        let mut config = RenderConfig::new(sample_params(), ScrollMode::Pure);
        config.worker_count = Some(0);
        assert!(config.validate().is_err());
        config.worker_count = Some(4);
        assert!(config.validate().is_ok());
        assert_eq!(config.resolved_worker_count(), 4);
    }

    #[test]
    fn padded_mode_rejects_negative_hold() {
        let config = RenderConfig::new(
            sample_params(),
            ScrollMode::Padded {
                head_static_secs: -1.0,
                tail_static_secs: 3.0,
            },
        );
        assert!(config.validate().is_err());
    }
}
