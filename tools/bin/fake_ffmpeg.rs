//! A tiny stand-in for `ffmpeg` used by integration tests that exercise
//! `EncoderProcess` against a real child process without depending on a
//! system `ffmpeg` install.
//!
//! Reads fixed-size "frames" from stdin and behaves according to flags:
//!
//! - `--frame-bytes N` (default 768): size of one frame, in bytes.
//! - `--fail-after N`: read `N` frames, then exit with status 1 (models
//!   scenario 4, an encoder that dies partway through the stream).
//! - `--never-read`: never touch stdin; just sleep (models scenario 5, a
//!   stalled encoder the watchdog must kill).
//! - with neither flag: drain stdin to EOF, then exit 0 (models a
//!   successful encode).

use std::env;
use std::io::Read;
use std::time::Duration;

fn main() {
    let args: Vec<String> = env::args().collect();
    let mut frame_bytes: usize = 768;
    let mut fail_after: Option<u64> = None;
    let mut never_read = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--frame-bytes" => {
                i += 1;
                frame_bytes = args[i].parse().expect("--frame-bytes takes an integer");
            }
            "--fail-after" => {
                i += 1;
                fail_after = Some(args[i].parse().expect("--fail-after takes an integer"));
            }
            "--never-read" => never_read = true,
            _ => {}
        }
        i += 1;
    }

    if never_read {
        // Never consumes stdin: a real pipe would eventually block the
        // writer once its OS buffer fills, simulating a stalled encoder.
        loop {
            std::thread::sleep(Duration::from_secs(3600));
        }
    }

    let mut stdin = std::io::stdin().lock();
    let mut buf = vec![0u8; frame_bytes];
    let mut frames_read: u64 = 0;

    loop {
        if let Some(limit) = fail_after {
            if frames_read >= limit {
                std::process::exit(1);
            }
        }
        match read_exact_or_eof(&mut stdin, &mut buf) {
            ReadOutcome::Full => frames_read += 1,
            ReadOutcome::Eof => break,
        }
    }

    std::process::exit(0);
}

enum ReadOutcome {
    Full,
    Eof,
}

/// Like `Read::read_exact`, but treats a zero-byte first read as a clean
/// EOF instead of an error -- a short/partial frame left by a dropped pipe
/// is also treated as EOF since there's nothing a stub encoder could do
/// with a truncated frame.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> ReadOutcome {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return ReadOutcome::Eof,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return ReadOutcome::Eof,
        }
    }
    ReadOutcome::Full
}
