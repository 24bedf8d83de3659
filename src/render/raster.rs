//! # Image to Raster Encoding
//!
//! Converts an arbitrary bitmap into the byte stream a BLE thermal printer
//! prints: `ESC @` followed by one `GS v 0` raster command.
//!
//! ## Pipeline
//!
//! ```text
//! DynamicImage ─► resize to width_dots × height ─► PixelBuffer
//!              ─► threshold green channel ─► packed rows + blank feed rows
//!              ─► ESC @ + GS v 0 header + payload
//! ```
//!
//! ## Thresholding
//!
//! Only the green channel is sampled: a dot is inked when `green < 128`.
//! This is a cheap luminance proxy and matches what deployed printers have
//! always received, so it is kept rather than replaced by weighted luminance.
//! There is no dithering.
//!
//! ## Output Length
//!
//! ```text
//! 2 (ESC @) + 8 (GS v 0 header) + width_bytes × (height + padding_rows)
//! ```

use image::{DynamicImage, GenericImageView, GrayImage, Luma, imageops::FilterType};

use super::pixels::PixelBuffer;
use crate::error::ThermobleError;
use crate::printer::PrinterConfig;
use crate::protocol::{commands, graphics};

/// Green values below this are printed as black.
pub const INK_THRESHOLD: u8 = 128;

/// Encoder knobs. The defaults reproduce the printer protocol exactly.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Blank rows appended below the image so the paper feeds past the head
    pub padding_rows: u32,
    /// Resampling filter used to scale the source to the print width
    pub filter: FilterType,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            padding_rows: PrinterConfig::DEFAULT_PADDING_ROWS,
            filter: FilterType::Triangle,
        }
    }
}

impl From<&PrinterConfig> for EncodeOptions {
    fn from(config: &PrinterConfig) -> Self {
        Self {
            padding_rows: config.padding_rows,
            ..Self::default()
        }
    }
}

/// # Packed Raster Image
///
/// A `GS v 0` command: 8-byte header followed by `width_bytes × height_rows`
/// bytes of packed dots. `height_rows` includes the padding rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width_bytes: u16,
    height_rows: u16,
    image_rows: u16,
    packed: Vec<u8>,
}

impl RasterImage {
    /// Scale, threshold and pack `image` at `width_dots` wide.
    ///
    /// ## Caller Contract
    ///
    /// `width_dots` must be a positive multiple of 8. Other widths are not
    /// rounded: only the first `width_dots / 8` whole bytes of each row are
    /// packed, and debug builds assert.
    ///
    /// ## Errors
    ///
    /// - The source image has a zero dimension
    /// - `width_dots` is below 8
    /// - The total row count (image + padding) does not fit in 16 bits
    pub fn from_image(
        image: &DynamicImage,
        width_dots: u32,
        options: &EncodeOptions,
    ) -> Result<Self, ThermobleError> {
        debug_assert!(
            width_dots % 8 == 0,
            "width_dots must be a multiple of 8, got {}",
            width_dots
        );

        let (src_width, src_height) = image.dimensions();
        if src_width == 0 || src_height == 0 {
            return Err(ThermobleError::Image(format!(
                "Source image is empty ({}x{})",
                src_width, src_height
            )));
        }

        let width_bytes = width_dots / 8;
        if width_bytes == 0 {
            return Err(ThermobleError::Image(format!(
                "Print width must be at least 8 dots, got {}",
                width_dots
            )));
        }

        let height = scaled_height(src_width, src_height, width_dots);
        let total_rows = height
            .checked_add(options.padding_rows)
            .filter(|&rows| rows <= u16::MAX as u32 && width_bytes <= u16::MAX as u32)
            .ok_or_else(|| {
                ThermobleError::Image(format!(
                    "Raster too large: {} bytes x ({} + {}) rows",
                    width_bytes, height, options.padding_rows
                ))
            })?;

        let pixels = PixelBuffer::from_rgba(
            image
                .resize_exact(width_dots, height, options.filter)
                .to_rgba8(),
        );

        let row_bytes = width_bytes as usize;
        let mut payload = vec![0u8; row_bytes * total_rows as usize];
        // Padding rows stay zero.
        for (y, row) in payload
            .chunks_exact_mut(row_bytes)
            .take(height as usize)
            .enumerate()
        {
            pack_row(&pixels, y, row);
        }

        Ok(Self {
            width_bytes: width_bytes as u16,
            height_rows: total_rows as u16,
            image_rows: height as u16,
            packed: graphics::raster_bit_image(width_bytes as u16, total_rows as u16, &payload),
        })
    }

    #[inline]
    pub fn width_bytes(&self) -> u16 {
        self.width_bytes
    }

    /// Rows including padding
    #[inline]
    pub fn height_rows(&self) -> u16 {
        self.height_rows
    }

    /// Rows that came from the source image
    #[inline]
    pub fn image_rows(&self) -> u16 {
        self.image_rows
    }

    /// Header plus payload
    #[inline]
    pub fn packed(&self) -> &[u8] {
        &self.packed
    }

    /// Payload without the header
    pub fn payload(&self) -> &[u8] {
        &self.packed[graphics::RASTER_HEADER_LEN..]
    }

    /// One packed row, `None` past the last row.
    pub fn row(&self, y: usize) -> Option<&[u8]> {
        let width = self.width_bytes as usize;
        self.payload().chunks_exact(width).nth(y)
    }

    /// Render the packed dots back to a grayscale image (black = ink).
    pub fn to_preview(&self) -> GrayImage {
        let width_dots = self.width_bytes as u32 * 8;
        let mut img = GrayImage::new(width_dots, self.height_rows as u32);

        for (y, row) in self
            .payload()
            .chunks_exact(self.width_bytes as usize)
            .enumerate()
        {
            for x in 0..width_dots as usize {
                let is_black = (row[x / 8] >> (7 - (x % 8))) & 1 == 1;
                let color = if is_black { 0u8 } else { 255u8 };
                img.put_pixel(x as u32, y as u32, Luma([color]));
            }
        }

        img
    }

    /// Full printer command: `ESC @` followed by the raster command.
    pub fn to_command(&self) -> Vec<u8> {
        let mut data = commands::init();
        data.extend_from_slice(&self.packed);
        data
    }
}

/// # Encode an Image for Printing
///
/// Pure and deterministic: the same image and width always yield the same
/// bytes. Uses default [`EncodeOptions`] (100 padding rows).
///
/// ## Example
///
/// ```
/// use image::{DynamicImage, Rgba, RgbaImage};
/// use thermoble::render::raster;
///
/// let black = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255])));
/// let bytes = raster::encode(&black, 16).unwrap();
///
/// assert_eq!(&bytes[0..2], &[0x1B, 0x40]);
/// assert_eq!(bytes.len(), 10 + 2 * (16 + 100));
/// ```
pub fn encode(image: &DynamicImage, width_dots: u32) -> Result<Vec<u8>, ThermobleError> {
    encode_with(image, width_dots, &EncodeOptions::default())
}

/// [`encode`] with explicit options.
pub fn encode_with(
    image: &DynamicImage,
    width_dots: u32,
    options: &EncodeOptions,
) -> Result<Vec<u8>, ThermobleError> {
    Ok(RasterImage::from_image(image, width_dots, options)?.to_command())
}

/// Height that preserves the source aspect ratio at `width_dots` wide.
fn scaled_height(src_width: u32, src_height: u32, width_dots: u32) -> u32 {
    let height = (width_dots as f64 * src_height as f64 / src_width as f64).round();
    height.max(1.0) as u32
}

/// Pack one pixel row, MSB = leftmost dot.
fn pack_row(pixels: &PixelBuffer, y: usize, row: &mut [u8]) {
    for (byte_x, byte) in row.iter_mut().enumerate() {
        for bit in 0..8 {
            let x = byte_x * 8 + bit;
            if pixels.green(x, y).is_some_and(|g| g < INK_THRESHOLD) {
                *byte |= 0x80 >> bit;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
