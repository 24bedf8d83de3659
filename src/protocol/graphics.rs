//! # Raster Bit Image Command
//!
//! BLE receipt printers accept monochrome images through the ESC/POS
//! "print raster bit image" command (`GS v 0`).
//!
//! ## Bit Packing
//!
//! Graphics data is packed as bytes where each bit represents one dot:
//! - Bit 7 (MSB) = leftmost dot
//! - Bit 0 (LSB) = rightmost dot
//! - 1 = black (print), 0 = white (no print)
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! Byte value 0x0F = 00001111 = ░░░░████
//! ```

use super::commands::{GS, u16_le};

/// Length of the `GS v 0` header in bytes.
pub const RASTER_HEADER_LEN: usize = 8;

/// # Print Raster Bit Image (GS v 0 m xL xH yL yH d1...dk)
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | GS v 0 m xL xH yL yH d1...dk |
/// | Hex     | 1D 76 30 m xL xH yL yH d1...dk |
///
/// ## Parameters
///
/// - `m`: Mode, always 0 (normal density)
/// - `xL, xH`: Width in bytes, little-endian
/// - `yL, yH`: Height in rows, little-endian
/// - `d1...dk`: Row-major image data, k = width_bytes × height_rows
///
/// ## Example
///
/// ```
/// use thermoble::protocol::graphics;
///
/// let data = vec![0xFF; 48 * 10];
/// let cmd = graphics::raster_bit_image(48, 10, &data);
///
/// assert_eq!(&cmd[0..8], &[0x1D, 0x76, 0x30, 0x00, 48, 0, 10, 0]);
/// assert_eq!(cmd.len(), 8 + 48 * 10);
/// ```
pub fn raster_bit_image(width_bytes: u16, height_rows: u16, data: &[u8]) -> Vec<u8> {
    debug_assert!(
        data.len() == width_bytes as usize * height_rows as usize,
        "Raster data length mismatch. Expected {} ({} bytes × {} rows), got {}",
        width_bytes as usize * height_rows as usize,
        width_bytes,
        height_rows,
        data.len()
    );

    let mut cmd = Vec::with_capacity(RASTER_HEADER_LEN + data.len());
    cmd.extend_from_slice(&raster_header(width_bytes, height_rows));
    cmd.extend_from_slice(data);
    cmd
}

/// The 8-byte `GS v 0` header on its own.
pub fn raster_header(width_bytes: u16, height_rows: u16) -> [u8; RASTER_HEADER_LEN] {
    let [xl, xh] = u16_le(width_bytes);
    let [yl, yh] = u16_le(height_rows);
    [GS, b'v', b'0', 0x00, xl, xh, yl, yh]
}
