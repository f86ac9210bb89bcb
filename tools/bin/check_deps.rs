use std::env;
use std::process::{Command as ProcessCommand, Stdio};

#[derive(Debug)]
struct CheckResult {
    name: String,
    passed: bool,
    version: Option<String>,
}

impl CheckResult {
    fn pass_with_version(name: String, version: String) -> Self {
        Self { name, passed: true, version: Some(version) }
    }

    fn fail(name: String) -> Self {
        Self { name, passed: false, version: None }
    }
}

fn check_ffmpeg() -> CheckResult {
    let mut cmd = ProcessCommand::new("ffmpeg");
    cmd.arg("-version").stdout(Stdio::piped()).stderr(Stdio::null());
    match cmd.output() {
        Ok(output) if output.status.success() => {
            let first_line = String::from_utf8_lossy(&output.stdout).lines().next().unwrap_or("ffmpeg").to_string();
            CheckResult::pass_with_version("ffmpeg on PATH".to_string(), first_line)
        }
        _ => CheckResult::fail("ffmpeg on PATH".to_string()),
    }
}

/// Probes for an encoder by name in `ffmpeg -hide_banner -encoders` output.
/// Missing hardware encoders are not fatal: `--gpu` silently falls back to
/// `libx264` at render time (see `encoder::EncoderBackend::select`), so this
/// is reported as informational rather than a failed check.
fn check_encoder(encoder: &str) -> CheckResult {
    let mut cmd = ProcessCommand::new("ffmpeg");
    cmd.args(["-hide_banner", "-encoders"]).stdout(Stdio::piped()).stderr(Stdio::null());
    match cmd.output() {
        Ok(output) if output.status.success() => {
            let listed = String::from_utf8_lossy(&output.stdout).lines().any(|line| line.contains(encoder));
            if listed {
                CheckResult::pass_with_version(encoder.to_string(), "available".to_string())
            } else {
                CheckResult::fail(encoder.to_string())
            }
        }
        _ => CheckResult::fail(encoder.to_string()),
    }
}

fn print_section(title: &str) {
    println!();
    println!("== {} ==", title);
}

fn print_result(result: &CheckResult) {
    match (&result.passed, &result.version) {
        (true, Some(version)) => println!("[OK]   {} ({})", result.name, version),
        (true, None) => println!("[OK]   {}", result.name),
        (false, _) => println!("[FAIL] {}", result.name),
    }
}

fn main() {
    let os = env::consts::OS;
    println!("Detected OS: {}", os);

    print_section("Core tools");
    let ffmpeg = check_ffmpeg();
    let ffmpeg_ok = ffmpeg.passed;
    print_result(&ffmpeg);

    print_section("Encoders (informational; missing hardware encoders fall back to libx264)");
    for encoder in ["libx264", "h264_nvenc", "prores_ks"] {
        print_result(&check_encoder(encoder));
    }

    print_section("Summary");
    if ffmpeg_ok {
        println!("ffmpeg found. Ready to render.");
    } else {
        println!("ffmpeg was not found on PATH.");
        println!("Hints (Ubuntu/Debian):");
        println!("  sudo apt-get install -y ffmpeg");
        std::process::exit(1);
    }
}
