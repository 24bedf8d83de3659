//! # Printer Configuration
//!
//! Protocol and hardware parameters for BLE thermal printers.
//!
//! ## Presets
//!
//! | Preset | Width (dots) | Paper |
//! |--------|--------------|-------|
//! | [`generic_58mm`](PrinterConfig::generic_58mm) | 384 | 58mm |
//! | [`generic_80mm`](PrinterConfig::generic_80mm) | 576 | 80mm |
//!
//! ## Loading From a File
//!
//! Every field is optional in JSON; missing fields fall back to
//! [`PrinterConfig::generic_58mm`].
//!
//! ```json
//! { "width_dots": 576, "chunk_size": 20 }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::ThermobleError;

/// Build a full 128-bit UUID from a 16-bit Bluetooth SIG short id.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5f9b_34fb | ((short as u128) << 96))
}

/// Printing services the session accepts, in priority order.
pub const PRINTING_SERVICE_UUIDS: [Uuid; 2] = [uuid_from_u16(0x18F0), uuid_from_u16(0x1804)];

/// # Printer Configuration
///
/// ## Transfer Tuning
///
/// - **chunk_size**: bytes per write-without-response packet
/// - **drain_delay_ms**: wait after the last packet before disconnecting,
///   so the printer can empty its buffer
///
/// ## Image
///
/// - **width_dots**: raster width, must be a multiple of 8
/// - **padding_rows**: blank rows fed after the image
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Printer model name
    pub name: String,

    /// Print width in dots (pixels)
    pub width_dots: u32,

    /// Maximum bytes per BLE write
    pub chunk_size: usize,

    /// Advertisements compared before giving up on the target address
    pub scan_budget: u32,

    /// Blank rows appended below the image
    pub padding_rows: u32,

    /// Delay before disconnecting once all data is written (milliseconds)
    pub drain_delay_ms: u64,

    /// Accepted printing service UUIDs
    pub service_uuids: Vec<Uuid>,
}

impl PrinterConfig {
    pub const DEFAULT_CHUNK_SIZE: usize = 32;
    pub const DEFAULT_SCAN_BUDGET: u32 = 250;
    pub const DEFAULT_PADDING_ROWS: u32 = 100;
    pub const DEFAULT_DRAIN_DELAY_MS: u64 = 1000;

    /// 58mm paper, 384 dots. The most common BLE receipt printer.
    pub fn generic_58mm() -> Self {
        Self {
            name: "Generic 58mm".to_string(),
            width_dots: 384,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            scan_budget: Self::DEFAULT_SCAN_BUDGET,
            padding_rows: Self::DEFAULT_PADDING_ROWS,
            drain_delay_ms: Self::DEFAULT_DRAIN_DELAY_MS,
            service_uuids: PRINTING_SERVICE_UUIDS.to_vec(),
        }
    }

    /// 80mm paper, 576 dots.
    pub fn generic_80mm() -> Self {
        Self {
            name: "Generic 80mm".to_string(),
            width_dots: 576,
            ..Self::generic_58mm()
        }
    }

    /// Load a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ThermobleError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ThermobleError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Parse a configuration from JSON text and validate it.
    pub fn from_json(text: &str) -> Result<Self, ThermobleError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ThermobleError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the encoder and session rely on.
    pub fn validate(&self) -> Result<(), ThermobleError> {
        if self.width_dots == 0 || self.width_dots % 8 != 0 {
            return Err(ThermobleError::Config(format!(
                "width_dots must be a positive multiple of 8, got {}",
                self.width_dots
            )));
        }
        if self.chunk_size == 0 {
            return Err(ThermobleError::Config("chunk_size must be positive".to_string()));
        }
        if self.scan_budget == 0 {
            return Err(ThermobleError::Config("scan_budget must be positive".to_string()));
        }
        if self.padding_rows > u16::MAX as u32 {
            return Err(ThermobleError::Config(format!(
                "padding_rows must be at most {}, got {}",
                u16::MAX,
                self.padding_rows
            )));
        }
        if self.service_uuids.is_empty() {
            return Err(ThermobleError::Config(
                "service_uuids must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Width in bytes (width_dots / 8)
    #[inline]
    pub fn width_bytes(&self) -> u32 {
        self.width_dots / 8
    }

    #[inline]
    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::generic_58mm()
    }
}
