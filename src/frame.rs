//! Frame builder (C2): turns a frame index into a windowed, composited
//! frame buffer.

use crate::compositor;
use crate::config::VideoParams;
use crate::scheduler::{Phase, ScrollPlan};
use crate::source::SourceImage;

/// A single output frame: `width * height * channels` bytes, row-major,
/// top-left origin. `channels` is 3 for opaque output, 4 for transparent.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub bytes: Vec<u8>,
}

impl Frame {
    fn background(width: u32, height: u32, channels: u8, bg_rgba: [u8; 4]) -> Self {
        let mut bytes = Vec::with_capacity(width as usize * height as usize * channels as usize);
        for _ in 0..(width as usize * height as usize) {
            bytes.extend_from_slice(&bg_rgba[..channels as usize]);
        }
        Self { index: 0, width, height, channels, bytes }
    }
}

/// Builds frame `i`. Pure modulo the shared, read-only `source`.
///
/// Implements `spec.md` §4.2 exactly: a past-end or fully-clipped window
/// returns a pre-filled background frame; otherwise the window
/// `[y0, y1)` is computed from the scroll position, and the opaque path
/// blends through [`compositor::composite_rows`] while the transparent path
/// copies RGBA rows straight through.
pub fn build_frame(i: u64, source: &SourceImage, params: &VideoParams, plan: &ScrollPlan) -> Frame {
    let channels: u8 = if params.transparent { 4 } else { 3 };
    let phase = plan.phase(i);

    if phase == Phase::PastEnd {
        let mut frame = Frame::background(params.width, params.height, channels, params.bg_rgba);
        frame.index = i;
        return frame;
    }

    let p_i = plan.position(i);
    let y0 = p_i.floor() as u32;
    let h_img = source.height();

    if y0 >= h_img {
        let mut frame = Frame::background(params.width, params.height, channels, params.bg_rgba);
        frame.index = i;
        return frame;
    }

    let y1 = (y0 + params.height).min(h_img);
    let h = (y1 - y0) as usize;

    let mut frame = Frame::background(params.width, params.height, channels, params.bg_rgba);
    frame.index = i;

    if h == 0 {
        return frame;
    }

    let width = params.width as usize;
    if params.transparent {
        for row in 0..h {
            let src_row = source.row(y0 + row as u32);
            let dst_start = row * width * 4;
            compositor::copy_rows_rgba(&src_row[..width * 4], &mut frame.bytes[dst_start..dst_start + width * 4]);
        }
    } else {
        let mut src_rgb = Vec::with_capacity(h * width * 3);
        let mut src_alpha = Vec::with_capacity(h * width);
        for row in 0..h {
            let src_row = source.row(y0 + row as u32);
            for px in 0..width {
                let base = px * 4;
                src_rgb.extend_from_slice(&src_row[base..base + 3]);
                src_alpha.push(src_row[base + 3]);
            }
        }
        let dst_rows_bytes = h * width * 3;
        compositor::composite_rows(&src_rgb, &src_alpha, &mut frame.bytes[..dst_rows_bytes], width);
    }

    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScrollMode;
    use image::RgbaImage;

    fn striped_source() -> SourceImage {
        // 16 wide, 48 tall: row 0 red, row 16 green, row 32 blue, white
        // everywhere else (a single colored marker line per "third", the
        // rest of the source already background-colored).
        let mut img = RgbaImage::new(16, 48);
        for y in 0..48u32 {
            let color = if y == 0 {
                [255, 0, 0, 255]
            } else if y == 16 {
                [0, 255, 0, 255]
            } else if y == 32 {
                [0, 0, 255, 255]
            } else {
                [255, 255, 255, 255]
            };
            for x in 0..16u32 {
                img.put_pixel(x, y, image::Rgba(color));
            }
        }
        SourceImage::new(img)
    }

    fn params() -> VideoParams {
        VideoParams {
            width: 16,
            height: 16,
            fps: 10,
            scroll_speed_px_per_frame: 2.0,
            bg_rgba: [255, 255, 255, 255],
            transparent: false,
            audio_path: None,
            output_path: "out.mp4".into(),
        }
    }

    #[test]
    fn tiny_opaque_scroll_scenario() {
        let source = striped_source();
        let p = params();
        let plan = ScrollPlan::new(source.height(), p.height, p.fps, p.scroll_speed_px_per_frame, ScrollMode::Pure);
        assert_eq!(plan.n_total(), 24);

        let frame0 = build_frame(0, &source, &p, &plan);
        assert_eq!(&frame0.bytes[0..3], &[255, 0, 0]);

        let frame8 = build_frame(8, &source, &p, &plan);
        assert_eq!(&frame8.bytes[0..3], &[0, 255, 0]);

        let frame16 = build_frame(16, &source, &p, &plan);
        assert_eq!(&frame16.bytes[0..3], &[0, 0, 255]);

        let frame20 = build_frame(20, &source, &p, &plan);
        assert!(frame20.bytes.chunks(3).all(|px| px == [255, 255, 255]));
    }

    #[test]
    fn transparent_output_pads_alpha_zero() {
        let mut img = RgbaImage::new(4, 8);
        for y in 0..4u32 {
            for x in 0..4u32 {
                img.put_pixel(x, y, image::Rgba([255, 255, 255, 255]));
            }
        }
        for y in 4..8u32 {
            for x in 0..4u32 {
                img.put_pixel(x, y, image::Rgba([0, 0, 0, 0]));
            }
        }
        let source = SourceImage::new(img);
        let p = VideoParams {
            width: 4,
            height: 4,
            fps: 10,
            scroll_speed_px_per_frame: 1.0,
            bg_rgba: [0, 0, 0, 0],
            transparent: true,
            audio_path: None,
            output_path: "out.mov".into(),
        };
        let plan = ScrollPlan::new(source.height(), p.height, p.fps, p.scroll_speed_px_per_frame, ScrollMode::Pure);
        let frame4 = build_frame(4, &source, &p, &plan);
        for px in frame4.bytes.chunks(4) {
            assert_eq!(px[3], 0);
        }
    }

    #[test]
    fn past_end_returns_full_background() {
        let source = striped_source();
        let p = params();
        let plan = ScrollPlan::new(source.height(), p.height, p.fps, p.scroll_speed_px_per_frame, ScrollMode::Pure);
        let frame = build_frame(plan.n_total() + 1, &source, &p, &plan);
        assert!(frame.bytes.chunks(3).all(|px| px == [255, 255, 255]));
    }
}
