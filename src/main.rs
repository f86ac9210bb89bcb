use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use scrollreel::config::{EncoderPreset, RenderConfig, ScrollMode, VideoParams};
use scrollreel::error::{HasRecoverySuggestion, classify};
use scrollreel::source::SourceImage;

/// Renders a tall source image as a vertically scrolling video via ffmpeg.
#[derive(Parser, Debug)]
#[command(name = "scrollreel")]
#[command(about = "Render a tall image as a scrolling video")]
struct Args {
    /// Path to the pre-rendered tall RGBA source image (PNG or any format
    /// the `image` crate decodes).
    source: PathBuf,

    /// Output video path.
    #[arg(short, long, default_value = "out.mp4")]
    output: PathBuf,

    /// Output frame width in pixels.
    #[arg(long, default_value_t = 1080)]
    width: u32,

    /// Output frame height in pixels (the viewport height).
    #[arg(long, default_value_t = 1920)]
    height: u32,

    /// Frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Scroll speed in pixels per frame (must be >= 0.5).
    #[arg(long, default_value_t = 2.0)]
    scroll_speed: f64,

    /// Background color as an "r,g,b,a" tuple of bytes.
    #[arg(long, default_value = "255,255,255,255", value_parser = parse_rgba)]
    bg_color: [u8; 4],

    /// Emit an RGBA stream with a transparent background (forces a ProRes
    /// 4444 `.mov` output).
    #[arg(long)]
    transparent: bool,

    /// Optional audio track to mux in, trimmed to the video via `-shortest`.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Scroll mode: "pure" (no padding) or "padded" (static head/tail hold).
    #[arg(long, default_value = "pure", value_parser = parse_scroll_mode)]
    scroll_mode: ScrollMode,

    /// Encoder quality preset: fast, balanced, or quality.
    #[arg(long, default_value = "balanced", value_parser = parse_encoder_preset)]
    preset: EncoderPreset,

    /// Overrides the default worker-thread count.
    #[arg(long)]
    workers: Option<usize>,

    /// Attempt a hardware encoder before the software fallback.
    #[arg(long)]
    gpu: bool,
}

impl Args {
    /// Converts parsed CLI flags into a [`RenderConfig`]. Pure field
    /// reshuffling; `RenderConfig::validate` (called from [`scrollreel::render`])
    /// is the single place that actually rejects bad values.
    fn into_config(self) -> RenderConfig {
        RenderConfig {
            video: VideoParams {
                width: self.width,
                height: self.height,
                fps: self.fps,
                scroll_speed_px_per_frame: self.scroll_speed,
                bg_rgba: self.bg_color,
                transparent: self.transparent,
                audio_path: self.audio,
                output_path: self.output,
            },
            scroll_mode: self.scroll_mode,
            worker_count: self.workers,
            encoder_preset: self.preset,
            prefer_gpu: self.gpu,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let source_path = args.source.clone();
    let config = args.into_config();

    let source = match SourceImage::load(&source_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(classify::exit_code(&err) as u8);
        }
    };

    match scrollreel::render(&config, source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(suggestion) = err.recovery_suggestion() {
                eprintln!("hint: {suggestion}");
            }
            ExitCode::from(classify::exit_code(&err) as u8)
        }
    }
}

/// Parses `"r,g,b,a"` into a byte array.
fn parse_rgba(value: &str) -> Result<[u8; 4], String> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 4 {
        return Err(format!("expected 4 comma-separated components, got {}", parts.len()));
    }
    let mut out = [0u8; 4];
    for (slot, part) in out.iter_mut().zip(parts.iter()) {
        *slot = part.trim().parse::<u8>().map_err(|_| format!("invalid byte component: {part}"))?;
    }
    Ok(out)
}

/// Parses `"pure"` or `"padded"` into a [`ScrollMode`], using the default
/// 3-second static hold for padded mode.
fn parse_scroll_mode(value: &str) -> Result<ScrollMode, String> {
    match value.to_lowercase().as_str() {
        "pure" => Ok(ScrollMode::Pure),
        "padded" => Ok(ScrollMode::padded_default()),
        other => Err(format!("invalid scroll mode: {other}. Use: pure, padded")),
    }
}

/// Parses a quality preset name into an [`EncoderPreset`].
fn parse_encoder_preset(value: &str) -> Result<EncoderPreset, String> {
    match value.to_lowercase().as_str() {
        "fast" => Ok(EncoderPreset::Fast),
        "balanced" => Ok(EncoderPreset::Balanced),
        "quality" => Ok(EncoderPreset::Quality),
        other => Err(format!("invalid encoder preset: {other}. Use: fast, balanced, quality")),
    }
}
