//! Encoder driver wrapper (C6): spawns `ffmpeg` as a child process, feeds it
//! raw frames over its stdin pipe, drains its diagnostic stream, and
//! enforces the stall/exit watchdog.
//!
//! Argument groups follow spec.md §6 exactly: I/O tuning (`probesize`,
//! `analyzeduration`, `thread_queue_size`), the raw-video input
//! declaration, `vsync`, the codec-specific output group, and the optional
//! audio mux. Grounded on `examples/moreWax-cap/src/scrap.rs`'s
//! `Command::new("ffmpeg")` / `Stdio::piped()` / `wait()` shape, with the
//! codec argument groups themselves taken from
//! `original_source/.../renderer/video_renderer.py`'s
//! `_get_ffmpeg_command` / `_get_codec_parameters`.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{EncoderPreset, VideoParams};
use crate::error::{RenderError, RenderResult};

/// No progress for this long and the watchdog declares a stall.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Grace period between `terminate()` and the forced `kill()` escalation.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(1);
/// How long the wrapper waits for a clean exit once stdin is closed.
pub const ENCODE_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
/// Polling interval used by the timeout-bounded `wait` loop.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How many trailing stderr lines are kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Which concrete encoder invocation to build. The transparent path is
/// fixed by `VideoParams::transparent`; the opaque paths are a caller
/// choice gated by GPU availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderBackend {
    /// `libx264`, CPU, always available.
    SoftwareX264,
    /// `h264_nvenc`, requires a usable NVIDIA encoder.
    HardwareNvenc,
    /// `prores_ks` 4444 with an alpha channel; forced whenever
    /// `transparent` is set, regardless of GPU preference.
    ProResTransparent,
}

impl EncoderBackend {
    /// Picks a backend for the given params: transparency always wins;
    /// otherwise GPU is used only if the caller asked for it and `NO_GPU`
    /// isn't set in the environment (spec.md §6).
    pub fn select(params: &VideoParams, prefer_gpu: bool) -> Self {
        if params.transparent {
            return Self::ProResTransparent;
        }
        if prefer_gpu && std::env::var_os("NO_GPU").is_none() {
            Self::HardwareNvenc
        } else {
            Self::SoftwareX264
        }
    }

    /// The software fallback for this backend, used after a hardware
    /// encode fails (spec.md §4.6). Transparent renders have no fallback:
    /// ProRes is already the software path.
    pub fn software_fallback(self) -> Option<Self> {
        match self {
            Self::HardwareNvenc => Some(Self::SoftwareX264),
            Self::SoftwareX264 | Self::ProResTransparent => None,
        }
    }

    fn pixel_format(self, transparent: bool) -> &'static str {
        if transparent { "rgba" } else { "rgb24" }
    }

    fn codec_args(self, preset: EncoderPreset) -> Vec<String> {
        match self {
            Self::SoftwareX264 => {
                let (x264_preset, crf) = preset.x264_args();
                vec![
                    "-c:v".into(), "libx264".into(),
                    "-preset".into(), x264_preset.into(),
                    "-crf".into(), crf.to_string(),
                    "-pix_fmt".into(), "yuv420p".into(),
                    "-movflags".into(), "+faststart".into(),
                ]
            }
            Self::HardwareNvenc => vec![
                "-c:v".into(), "h264_nvenc".into(),
                "-preset".into(), "p1".into(),
                "-rc".into(), "vbr".into(),
                "-cq".into(), "28".into(),
                "-b:v".into(), "4M".into(),
                "-pix_fmt".into(), "yuv420p".into(),
                "-movflags".into(), "+faststart".into(),
            ],
            Self::ProResTransparent => vec![
                "-c:v".into(), "prores_ks".into(),
                "-profile:v".into(), "4444".into(),
                "-pix_fmt".into(), "yuva444p10le".into(),
                "-alpha_bits".into(), "16".into(),
                "-vendor".into(), "ap10".into(),
            ],
        }
    }

    /// Forced output extension for this backend, if any (ProRes 4444 needs
    /// a QuickTime container).
    pub fn forced_extension(self) -> Option<&'static str> {
        match self {
            Self::ProResTransparent => Some("mov"),
            _ => None,
        }
    }
}

/// Builds the full `ffmpeg` argument vector for one render attempt.
pub fn build_args(params: &VideoParams, preset: EncoderPreset, backend: EncoderBackend) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into()];

    args.extend(["-probesize".into(), "20M".into()]);
    args.extend(["-analyzeduration".into(), "20M".into()]);
    args.extend(["-thread_queue_size".into(), "8192".into()]);

    args.extend(["-f".into(), "rawvideo".into()]);
    args.extend(["-vcodec".into(), "rawvideo".into()]);
    args.extend(["-s".into(), format!("{}x{}", params.width, params.height)]);
    args.extend(["-pix_fmt".into(), backend.pixel_format(params.transparent).into()]);
    args.extend(["-r".into(), params.fps.to_string()]);
    args.extend(["-vsync".into(), "1".into()]);
    args.extend(["-i".into(), "-".into()]);

    if let Some(audio) = &params.audio_path {
        args.extend(["-i".into(), audio.display().to_string()]);
    }

    args.extend(backend.codec_args(preset));

    if params.audio_path.is_some() {
        args.extend([
            "-c:a".into(), "aac".into(),
            "-b:a".into(), "192k".into(),
            "-map".into(), "0:v:0".into(),
            "-map".into(), "1:a:0".into(),
            "-shortest".into(),
        ]);
    } else {
        args.extend(["-map".into(), "0:v:0".into()]);
    }

    args.push(resolved_output_path(&params.output_path, backend).display().to_string());
    args
}

/// Applies `backend`'s forced container extension (ProRes 4444 needs a
/// QuickTime container) to the caller-chosen output path, leaving it
/// unchanged for backends with no forced extension.
fn resolved_output_path(output_path: &std::path::Path, backend: EncoderBackend) -> std::path::PathBuf {
    match backend.forced_extension() {
        Some(ext) => output_path.with_extension(ext),
        None => output_path.to_path_buf(),
    }
}

/// A spawned `ffmpeg` child process plus its diagnostic-drain threads.
pub struct EncoderProcess {
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    drain_handles: Vec<JoinHandle<()>>,
}

impl EncoderProcess {
    /// Spawns `ffmpeg` with the argument vector for `backend`, piping
    /// stdin and draining stdout/stderr on background threads so neither
    /// pipe's buffer can back up and deadlock the child.
    pub fn spawn(params: &VideoParams, preset: EncoderPreset, backend: EncoderBackend) -> RenderResult<Self> {
        Self::spawn_with("ffmpeg", &build_args(params, preset, backend))
    }

    /// Spawns `program` with `args`, wired up identically to
    /// [`spawn`](Self::spawn) (piped stdin, drained stdout/stderr). Kept
    /// separate so integration tests can point the driver at a tiny stub
    /// binary (`tools/bin/fake_ffmpeg.rs`) instead of a real `ffmpeg`
    /// install, to exercise the encoder-exit and watchdog-stall paths
    /// deterministically.
    pub fn spawn_with(program: &str, args: &[String]) -> RenderResult<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RenderError::encoder_spawn(program, e))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        let mut drain_handles = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            drain_handles.push(thread::spawn(move || drain_stdout(stdout)));
        }
        if let Some(stderr) = stderr {
            let tail = Arc::clone(&stderr_tail);
            drain_handles.push(thread::spawn(move || drain_stderr(stderr, tail)));
        }

        Ok(Self { child: Arc::new(Mutex::new(child)), stdin, stderr_tail, drain_handles })
    }

    /// Takes ownership of stdin so the caller can write frames to it and
    /// later drop it to signal end-of-stream.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// A cloneable handle the watchdog thread can use to terminate/kill
    /// the child independently of the orchestrating thread.
    pub fn child_handle(&self) -> Arc<Mutex<Child>> {
        Arc::clone(&self.child)
    }

    /// Sends the platform termination signal. Idempotent if the child has
    /// already exited.
    pub fn terminate(&self) {
        let _ = self.child.lock().unwrap().kill();
    }

    /// Forces termination. `std::process::Child::kill` has no separate
    /// SIGTERM/SIGKILL distinction on stable std, so escalation here is
    /// "call it again after the grace period" rather than a stronger
    /// signal — the same limitation the rest of the ecosystem works
    /// around with a signal crate, which this pipeline has no other need
    /// for.
    pub fn kill(&self) {
        let _ = self.child.lock().unwrap().kill();
    }

    /// Waits up to `timeout` for the child to exit, polling `try_wait`.
    /// Returns `Ok(None)` on timeout without having reaped the process.
    pub fn wait_timeout(&self, timeout: Duration) -> RenderResult<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.lock().unwrap().try_wait().map_err(|e| RenderError::encoder_spawn("ffmpeg", e))? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Joins the stdout/stderr drain threads. Call only after the child
    /// has exited, or this may block indefinitely on a pipe that's still
    /// open.
    pub fn join_drains(&mut self) {
        for handle in self.drain_handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// The last (up to) [`STDERR_TAIL_LINES`] lines of stderr, joined with
    /// newlines, for attaching to `EncoderExitError`.
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail.lock().unwrap().iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

fn drain_stdout(stdout: impl std::io::Read) {
    let reader = BufReader::new(stdout);
    for line in reader.lines().map_while(Result::ok) {
        let _ = line; // ffmpeg writes progress to stderr, not stdout; stdout is drained purely to prevent a full-buffer stall.
    }
}

fn drain_stderr(stderr: impl std::io::Read, tail: Arc<Mutex<VecDeque<String>>>) {
    let reader = BufReader::new(stderr);
    for line in reader.lines().map_while(Result::ok) {
        let lower = line.to_ascii_lowercase();
        if lower.contains("error") || lower.contains("warning") {
            eprintln!("ffmpeg: {line}");
        }
        let mut tail = tail.lock().unwrap();
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

/// Supervises frame-emission progress in the background. If
/// `frames_emitted` hasn't advanced for [`STALL_TIMEOUT`], sets `abort`,
/// marks `stalled`, and terminates `child` itself; if it's still alive
/// [`TERMINATE_GRACE`] later, kills it. The thread exits once `done` is
/// set (normal completion) or a stall has been handled.
pub fn spawn_watchdog(
    child: Arc<Mutex<Child>>,
    frames_emitted: Arc<AtomicU64>,
    done: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
) -> JoinHandle<()> {
    spawn_watchdog_with_timeouts(child, frames_emitted, done, abort, stalled, STALL_TIMEOUT, TERMINATE_GRACE)
}

/// Same as [`spawn_watchdog`] but with injectable timeouts, so tests can
/// exercise the stall-detection and terminate/kill escalation on a
/// millisecond timescale instead of waiting out the real 30s/1s production
/// values.
fn spawn_watchdog_with_timeouts(
    child: Arc<Mutex<Child>>,
    frames_emitted: Arc<AtomicU64>,
    done: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
    stall_timeout: Duration,
    terminate_grace: Duration,
) -> JoinHandle<()> {
    let poll_interval = (stall_timeout / 10).clamp(Duration::from_millis(1), Duration::from_millis(500));
    thread::spawn(move || {
        let mut last_count = frames_emitted.load(Ordering::Relaxed);
        let mut last_progress = Instant::now();

        loop {
            thread::sleep(poll_interval);
            if done.load(Ordering::Relaxed) {
                return;
            }

            let count = frames_emitted.load(Ordering::Relaxed);
            if count != last_count {
                last_count = count;
                last_progress = Instant::now();
                continue;
            }

            if last_progress.elapsed() >= stall_timeout {
                eprintln!("watchdog: no frame progress for {}s, terminating encoder", stall_timeout.as_secs());
                stalled.store(true, Ordering::Relaxed);
                abort.store(true, Ordering::Relaxed);
                let _ = child.lock().unwrap().kill();
                thread::sleep(terminate_grace);
                let still_alive = matches!(child.lock().unwrap().try_wait(), Ok(None));
                if still_alive {
                    eprintln!("watchdog: encoder still alive after grace period, forcing kill");
                    let _ = child.lock().unwrap().kill();
                }
                return;
            }
        }
    })
}
