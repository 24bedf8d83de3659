//! # ESC/POS Protocol Implementation
//!
//! Low-level command builders for the ESC/POS dialect spoken by BLE
//! thermal receipt printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: Basic printer commands (init) and byte helpers
//! - [`graphics`]: Raster bit image command (`GS v 0`)
//!
//! ## Wire Format
//!
//! ```text
//! init:   1B 40
//! raster: 1D 76 30 00 wL wH hL hH payload...
//! ```
//!
//! ## Usage Example
//!
//! ```
//! use thermoble::protocol::{commands, graphics};
//!
//! let mut data = Vec::new();
//! data.extend(commands::init());
//! data.extend(graphics::raster_bit_image(48, 2, &[0xAA; 96]));
//!
//! assert_eq!(data.len(), 2 + 8 + 96);
//! ```

pub mod commands;
pub mod graphics;
