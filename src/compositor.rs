//! Pixel compositor (C1): the hot inner loop that alpha-blends one row-slice
//! of source pixels over a destination background.
//!
//! Row blocks are processed independently of each other, so large frames are
//! split into contiguous row chunks and blended in parallel with `rayon` —
//! the same row-chunked, stride-aware shape the corpus uses for its other
//! per-image pixel work, just applied to blending instead of resizing.

use rayon::prelude::*;

/// Frames below this many rows are blended on the calling thread; the
/// thread-pool dispatch overhead isn't worth it for a handful of rows (this
/// is also what keeps the scenario tests, which use tiny fixtures, fast and
/// single-threaded).
const PARALLEL_ROW_THRESHOLD: usize = 64;

/// Straight-alpha over-composite: `out = src_rgb * a + dst_rgb * (1 - a)`.
///
/// `src_rgb` and `src_alpha` must describe the same `rows * width` pixels;
/// `dst_rgb` is blended in place. `src_rgb.len() == dst_rgb.len() == rows *
/// width * 3`; `src_alpha.len() == rows * width`. Mismatched lengths are a
/// programming error and panic rather than returning a `Result` — per the
/// contract, there is nothing a caller can recover from at this layer.
pub fn composite_rows(src_rgb: &[u8], src_alpha: &[u8], dst_rgb: &mut [u8], width: usize) {
    assert_eq!(src_rgb.len(), dst_rgb.len());
    assert_eq!(src_alpha.len() * 3, src_rgb.len());
    let row_bytes = width * 3;
    let rows = src_alpha.len() / width;

    if rows >= PARALLEL_ROW_THRESHOLD {
        dst_rgb
            .par_chunks_mut(row_bytes)
            .zip(src_rgb.par_chunks(row_bytes))
            .zip(src_alpha.par_chunks(width))
            .for_each(|((dst_row, src_row), alpha_row)| {
                blend_row(src_row, alpha_row, dst_row);
            });
    } else {
        for ((dst_row, src_row), alpha_row) in dst_rgb
            .chunks_mut(row_bytes)
            .zip(src_rgb.chunks(row_bytes))
            .zip(src_alpha.chunks(width))
        {
            blend_row(src_row, alpha_row, dst_row);
        }
    }
}

fn blend_row(src_row: &[u8], alpha_row: &[u8], dst_row: &mut [u8]) {
    for (pixel_idx, &a) in alpha_row.iter().enumerate() {
        let alpha = a as f32 / 255.0;
        let s = pixel_idx * 3;
        for channel in 0..3 {
            let src = src_row[s + channel] as f32;
            let dst = dst_row[s + channel] as f32;
            dst_row[s + channel] = (src * alpha + dst * (1.0 - alpha)).round() as u8;
        }
    }
}

/// Copies RGBA source rows into an RGBA destination unchanged. Used on the
/// transparent output path, where compositing is skipped entirely and the
/// source's own alpha channel is carried straight through.
pub fn copy_rows_rgba(src_rgba: &[u8], dst_rgba: &mut [u8]) {
    debug_assert_eq!(src_rgba.len(), dst_rgba.len());
    dst_rgba.copy_from_slice(src_rgba);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_zero_leaves_destination_unchanged() {
        let src_rgb = vec![255u8, 0, 0, 255, 0, 0];
        let alpha = vec![0u8, 0];
        let mut dst = vec![10u8, 20, 30, 40, 50, 60];
        let expected = dst.clone();
        composite_rows(&src_rgb, &alpha, &mut dst, 2);
        assert_eq!(dst, expected);
    }

    #[test]
    fn alpha_one_replaces_destination_with_source() {
        let src_rgb = vec![255u8, 0, 0, 0, 255, 0];
        let alpha = vec![255u8, 255];
        let mut dst = vec![10u8, 20, 30, 40, 50, 60];
        composite_rows(&src_rgb, &alpha, &mut dst, 2);
        assert_eq!(dst, src_rgb);
    }

    #[test]
    fn half_alpha_averages_channels() {
        let src_rgb = vec![255u8, 255, 255];
        let alpha = vec![128u8];
        let mut dst = vec![0u8, 0, 0];
        composite_rows(&src_rgb, &alpha, &mut dst, 1);
        // 255 * (128/255) + 0 * (1 - 128/255) ~= 128
        assert!(dst.iter().all(|&c| (120..=136).contains(&c)));
    }

    #[test]
    fn large_frame_takes_parallel_path_and_matches_serial() {
        let width = 32usize;
        let rows = 200usize;
        let src_rgb: Vec<u8> = (0..rows * width * 3).map(|i| (i % 251) as u8).collect();
        let alpha: Vec<u8> = (0..rows * width).map(|i| (i % 255) as u8).collect();
        let mut dst_parallel = vec![7u8; rows * width * 3];
        let mut dst_serial = dst_parallel.clone();

        composite_rows(&src_rgb, &alpha, &mut dst_parallel, width);

        // Force the serial path by chunking one row at a time.
        for r in 0..rows {
            let row_bytes = width * 3;
            let a_start = r * width;
            composite_rows(
                &src_rgb[r * row_bytes..(r + 1) * row_bytes],
                &alpha[a_start..a_start + width],
                &mut dst_serial[r * row_bytes..(r + 1) * row_bytes],
                width,
            );
        }

        assert_eq!(dst_parallel, dst_serial);
    }

    #[test]
    fn copy_rows_rgba_preserves_alpha() {
        let src = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = vec![0u8; 8];
        copy_rows_rgba(&src, &mut dst);
        assert_eq!(dst, src);
    }
}
