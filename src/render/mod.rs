//! # Rendering Module
//!
//! This module turns bitmaps into monochrome raster data for thermal printers.
//!
//! ## Modules
//!
//! - [`pixels`]: Bounds-checked RGBA pixel access
//! - [`raster`]: Scaling, thresholding and `GS v 0` packing
//!
//! ## Usage Example
//!
//! ```
//! use image::{DynamicImage, Rgba, RgbaImage};
//! use thermoble::render::raster;
//!
//! let logo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 100, Rgba([0, 0, 0, 255])));
//!
//! // 384 dots wide, height follows the aspect ratio (192 rows + 100 feed rows)
//! let data = raster::encode(&logo, 384).unwrap();
//! assert_eq!(data.len(), 2 + 8 + 48 * (192 + 100));
//! ```

pub mod pixels;
pub mod raster;

pub use raster::{EncodeOptions, RasterImage, encode};
