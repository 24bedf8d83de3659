//! # Pixel Buffer
//!
//! A bounds-checked view over interleaved RGBA pixels. The encoder reads
//! individual channels through it instead of indexing raw memory.

use image::RgbaImage;

/// Bytes per RGBA pixel
const CHANNELS: usize = 4;

/// Interleaved RGBA pixels with an explicit row stride.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    stride: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap an RGBA image. Rows are tightly packed, so `stride = width * 4`.
    pub fn from_rgba(image: RgbaImage) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        Self {
            width,
            height,
            stride: width * CHANNELS,
            data: image.into_raw(),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes between the starts of two consecutive rows.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The RGBA value at (x, y), or `None` outside the buffer.
    pub fn rgba(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y * self.stride + x * CHANNELS;
        let px = self.data.get(offset..offset + CHANNELS)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// The green channel at (x, y).
    #[inline]
    pub fn green(&self, x: usize, y: usize) -> Option<u8> {
        self.rgba(x, y).map(|[_, g, _, _]| g)
    }
}
