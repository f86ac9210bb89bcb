//! The immutable source bitmap frames are windowed from.

use std::path::Path;

use image::RgbaImage;

use crate::error::{RenderError, RenderResult};

/// An immutable RGBA raster, `H_img >= H_video`, read-only for its entire
/// lifetime once constructed. Shared across worker threads behind an `Arc`
/// (realization (b) from `SPEC_FULL.md` §5 — this crate's workers are
/// threads in one process, not separate processes, so no named
/// shared-memory segment is needed).
#[derive(Debug)]
pub struct SourceImage {
    image: RgbaImage,
}

impl SourceImage {
    /// Wraps an already-decoded RGBA image. Does not copy.
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Decodes a PNG (or any format the `image` crate recognizes) from disk
    /// and converts it to RGBA8, returning `SourceError` on a decode failure.
    pub fn load(path: impl AsRef<Path>) -> RenderResult<Self> {
        let image = image::open(path.as_ref())
            .map_err(|e| RenderError::source(format!("failed to decode {}: {e}", path.as_ref().display())))?
            .to_rgba8();
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGBA bytes, row-major, top-left origin, 4 bytes per pixel.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Bytes of a single row, `[0, width*4)`.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width() as usize * 4;
        let start = y as usize * stride;
        &self.as_bytes()[start..start + stride]
    }

    /// Validates the source against a viewport height: the source must be
    /// at least as tall as the video, per `SourceImage`'s invariant
    /// `H_img >= H_video`.
    pub fn validate_against(&self, viewport_height: u32) -> RenderResult<()> {
        if self.height() < viewport_height {
            return Err(RenderError::source(format!(
                "source height {} is smaller than viewport height {viewport_height}",
                self.height()
            )));
        }
        if self.width() == 0 || self.height() == 0 {
            return Err(RenderError::source("source image has zero width or height"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> SourceImage {
        let mut img = RgbaImage::new(width, height);
        for pixel in img.pixels_mut() {
            pixel.0 = rgba;
        }
        SourceImage::new(img)
    }

    #[test]
    fn rejects_source_shorter_than_viewport() {
        let source = solid(16, 10, [0, 0, 0, 255]);
        assert!(source.validate_against(16).is_err());
    }

    #[test]
    fn accepts_source_at_least_as_tall_as_viewport() {
        let source = solid(16, 48, [0, 0, 0, 255]);
        assert!(source.validate_against(16).is_ok());
    }

    #[test]
    fn row_returns_expected_slice() {
        let source = solid(4, 4, [10, 20, 30, 255]);
        let row = source.row(2);
        assert_eq!(row.len(), 16);
        assert_eq!(&row[0..4], &[10, 20, 30, 255]);
    }
}
