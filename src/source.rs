//! # Image Sources
//!
//! Loads the bitmap to print from a local file or an `http(s)://` URL.
//! HEIC/HEIF photos (iPhone default) decode through libheif when the `heif`
//! feature is enabled; everything else goes through the `image` crate.

use std::fs;
use std::path::Path;

use image::DynamicImage;
use tracing::debug;

use crate::error::ThermobleError;

/// Load an image from a path or URL.
pub async fn load_image(source: &str) -> Result<DynamicImage, ThermobleError> {
    if is_url(source) {
        fetch_image(source).await
    } else {
        load_file(source)
    }
}

/// Read and decode an image file.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<DynamicImage, ThermobleError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
        ThermobleError::Image(format!("Failed to read {}: {}", path.display(), e))
    })?;
    decode(&bytes)
}

/// Download and decode an image.
pub async fn fetch_image(url: &str) -> Result<DynamicImage, ThermobleError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("thermoble/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ThermobleError::Image(format!("HTTP client error: {}", e)))?;

    debug!("Downloading {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ThermobleError::Image(format!("Failed to download {}: {}", url, e)))?;
    if !response.status().is_success() {
        return Err(ThermobleError::Image(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ThermobleError::Image(format!("Failed to read image data: {}", e)))?;

    decode(&bytes)
}

/// Decode image bytes, detecting HEIC/HEIF by magic number.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ThermobleError> {
    if is_heic(bytes) {
        return decode_heic(bytes);
    }
    image::load_from_memory(bytes)
        .map_err(|e| ThermobleError::Image(format!("Failed to decode image: {}", e)))
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// HEIC files have an "ftyp" box at offset 4 with a HEIF-family brand.
fn is_heic(data: &[u8]) -> bool {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return false;
    }
    matches!(
        &data[8..12],
        b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" | b"hevm" | b"hevs" | b"mif1" | b"msf1"
    )
}

#[cfg(feature = "heif")]
fn decode_heic(data: &[u8]) -> Result<DynamicImage, ThermobleError> {
    use image::RgbImage;
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(data)
        .map_err(|e| ThermobleError::Image(format!("Failed to read HEIC: {}", e)))?;
    let handle = ctx
        .primary_image_handle()
        .map_err(|e| ThermobleError::Image(format!("Failed to get primary image: {}", e)))?;
    let image = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(|e| ThermobleError::Image(format!("Failed to decode HEIC image: {}", e)))?;

    let planes = image.planes();
    let interleaved = planes
        .interleaved
        .ok_or_else(|| ThermobleError::Image("No interleaved RGB data in HEIC".to_string()))?;

    let (width, height) = (image.width(), image.height());
    let mut rgb = RgbImage::new(width, height);
    for y in 0..height {
        let row = y as usize * interleaved.stride;
        for x in 0..width {
            let offset = row + x as usize * 3;
            if let Some(px) = interleaved.data.get(offset..offset + 3) {
                rgb.put_pixel(x, y, image::Rgb([px[0], px[1], px[2]]));
            }
        }
    }

    Ok(DynamicImage::ImageRgb8(rgb))
}

#[cfg(not(feature = "heif"))]
fn decode_heic(_data: &[u8]) -> Result<DynamicImage, ThermobleError> {
    Err(ThermobleError::Image(
        "HEIC/HEIF support not enabled (build with --features heif)".to_string(),
    ))
}
