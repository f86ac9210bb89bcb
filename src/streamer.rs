//! Ordered streamer (C5): reassembles an out-of-order `(index, Frame)`
//! stream into strict index order and writes each frame's bytes to the
//! encoder's stdin exactly once, contiguously.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::{RenderError, RenderResult};
use crate::frame::Frame;

/// How often `stream_frames` re-checks the abort flag while waiting for
/// the next result. A blocking `recv()` would only ever notice abort once
/// every worker has honored it and dropped its sender, closing the
/// channel; polling keeps the streamer responsive even if that close is
/// delayed, per the "stops after flushing its current frame" cancellation
/// semantics in `SPEC_FULL.md` §5.
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on how many out-of-order frames the pending map may hold
/// before the streamer would rather block on `results.recv()` than grow
/// further. The worker pool's bounded result channel (see `pool.rs`) is the
/// actual backpressure mechanism — this is a sanity ceiling on the pending
/// map's own growth, matching the `pool_size * batch_size * 2` bound from
/// spec.md §4.5.
pub fn max_pending(worker_count: usize, batch_size: usize) -> usize {
    (worker_count * batch_size * 2).max(1)
}

/// Drains `results` in frame-index order, writing each frame's raw bytes to
/// `sink` via blocking, retried writes. Returns the number of frames
/// actually written.
///
/// Stops early (without error) if `abort` is set or `results` closes before
/// `n_total` frames have arrived — the caller is responsible for
/// classifying early termination as an error (worker failure) or expected
/// shutdown (encoder already failed and the watchdog told workers to stop).
pub fn stream_frames<W, F>(
    results: &Receiver<(u64, Frame)>,
    sink: &mut W,
    n_total: u64,
    abort: &AtomicBool,
    mut on_frame_written: F,
) -> RenderResult<u64>
where
    W: Write,
    F: FnMut(u64),
{
    let mut next_expected = 0u64;
    let mut pending: HashMap<u64, Frame> = HashMap::new();
    let mut written = 0u64;

    while next_expected < n_total {
        if abort.load(Ordering::Relaxed) {
            break;
        }

        let (index, frame) = match results.recv_timeout(ABORT_POLL_INTERVAL) {
            Ok(pair) => pair,
            // No result yet: loop back around to re-check abort rather
            // than staying blocked indefinitely.
            Err(RecvTimeoutError::Timeout) => continue,
            // Channel closed before every frame arrived: every worker
            // exited (abort, panic, or pool shutdown) without producing
            // the rest. The caller decides what that means.
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if index == next_expected {
            write_frame(sink, &frame, &mut written)?;
            on_frame_written(next_expected);
            next_expected += 1;
            while let Some(pending_frame) = pending.remove(&next_expected) {
                write_frame(sink, &pending_frame, &mut written)?;
                on_frame_written(next_expected);
                next_expected += 1;
            }
        } else {
            debug_assert!(index > next_expected, "duplicate or already-emitted frame index {index}");
            pending.insert(index, frame);
        }
    }

    Ok(written)
}

/// Writes one frame's bytes in full. `Write::write_all` already retries
/// short writes internally, so a short write never surfaces as two
/// logical frames; a `BrokenPipe` is mapped to `RenderError::Pipe` and the
/// caller is expected to set the abort flag in response.
fn write_frame<W: Write>(sink: &mut W, frame: &Frame, written: &mut u64) -> RenderResult<()> {
    sink.write_all(&frame.bytes).map_err(|e| RenderError::pipe(*written, e))?;
    *written += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::Arc;

    fn frame(index: u64, byte: u8) -> Frame {
        Frame {
            index,
            width: 1,
            height: 1,
            channels: 1,
            bytes: vec![byte],
        }
    }

    #[test]
    fn writes_out_of_order_arrivals_in_index_order() {
        let (tx, rx) = unbounded();
        tx.send((2, frame(2, b'c'))).unwrap();
        tx.send((0, frame(0, b'a'))).unwrap();
        tx.send((1, frame(1, b'b'))).unwrap();
        drop(tx);

        let abort = AtomicBool::new(false);
        let mut sink = Vec::new();
        let written = stream_frames(&rx, &mut sink, 3, &abort, |_| {}).unwrap();

        assert_eq!(written, 3);
        assert_eq!(sink, b"abc");
    }

    #[test]
    fn any_arrival_permutation_yields_identical_output() {
        let indices: Vec<u64> = (0..6).collect();
        let baseline: Vec<u8> = indices.iter().map(|&i| i as u8).collect();

        // A handful of representative shuffles, not every permutation —
        // the property is index-keyed reassembly, which a few distinct
        // orderings already exercise thoroughly.
        let orderings: [&[u64]; 4] = [
            &[0, 1, 2, 3, 4, 5],
            &[5, 4, 3, 2, 1, 0],
            &[2, 0, 4, 1, 5, 3],
            &[1, 0, 3, 2, 5, 4],
        ];

        for ordering in orderings {
            let (tx, rx) = unbounded();
            for &i in ordering {
                tx.send((i, frame(i, i as u8))).unwrap();
            }
            drop(tx);

            let abort = AtomicBool::new(false);
            let mut sink = Vec::new();
            let written = stream_frames(&rx, &mut sink, indices.len() as u64, &abort, |_| {}).unwrap();

            assert_eq!(written, indices.len() as u64);
            assert_eq!(sink, baseline, "ordering {ordering:?} diverged from the serial baseline");
        }
    }

    #[test]
    fn abort_stops_before_all_frames_written() {
        let (tx, rx) = unbounded();
        tx.send((0, frame(0, b'a'))).unwrap();
        // Index 1 never arrives, and the channel stays open — only the
        // abort flag (not a channel close) must be what unblocks the
        // streamer, so `stream_frames` must notice it without a further
        // `recv()` ever returning.
        let abort = Arc::new(AtomicBool::new(false));

        let flipper = {
            let abort = Arc::clone(&abort);
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                abort.store(true, Ordering::Relaxed);
            })
        };

        let mut sink = Vec::new();
        let written = stream_frames(&rx, &mut sink, 5, &abort, |_| {}).unwrap();
        flipper.join().unwrap();
        drop(tx);

        assert_eq!(written, 1);
        assert_eq!(sink, b"a");
    }

    #[test]
    fn broken_pipe_surfaces_as_pipe_error() {
        struct FailingSink;
        impl Write for FailingSink {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let (tx, rx) = unbounded();
        tx.send((0, frame(0, b'a'))).unwrap();
        drop(tx);

        let abort = AtomicBool::new(false);
        let mut sink = FailingSink;
        let err = stream_frames(&rx, &mut sink, 1, &abort, |_| {}).unwrap_err();
        assert_eq!(err.category(), "pipe");
    }
}
