//! # Thermoble - Bluetooth LE Thermal Printer Library
//!
//! Thermoble prints bitmaps on the generic BLE receipt printers sold under
//! many names (58mm and 80mm "POS" printers exposing an ESC/POS-style raster
//! command over a write-without-response GATT characteristic). It provides:
//!
//! - **Discovery**: a deduplicating list of named peripherals seen while scanning
//! - **Session**: a state machine driving scan, connect, GATT discovery and transfer
//! - **Raster encoding**: resize, threshold and pack an image into a `GS v 0` command
//! - **Transport**: a backend-neutral trait plus a btleplug implementation
//!
//! ## Quick Start
//!
//! ```no_run
//! use thermoble::{render, printer::PrinterConfig};
//!
//! let config = PrinterConfig::generic_58mm();
//! let image = image::open("receipt.png")?;
//!
//! // Full job bytes: init followed by the raster command
//! let bytes = render::encode(&image, config.width_dots)?;
//! assert_eq!(&bytes[..2], &[0x1B, 0x40]);
//!
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`discovery`] | Scan result tracking |
//! | [`session`] | Print job state machine and async driver |
//! | [`render`] | Image to raster conversion |
//! | [`protocol`] | Printer command builders |
//! | [`transport`] | BLE transport trait, chunking, btleplug backend |
//! | [`printer`] | Printer configurations |
//! | [`source`] | Loading images from files and URLs |
//! | [`error`] | Error types |

pub mod discovery;
pub mod error;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod session;
pub mod source;
pub mod transport;

// Re-exports for convenience
pub use discovery::{DeviceDiscoveryTracker, DiscoveredDevice};
pub use error::{SessionError, ThermobleError};
pub use printer::PrinterConfig;
pub use session::PrinterSession;

#[cfg(feature = "ble")]
pub use transport::BleTransport;
