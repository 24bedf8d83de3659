//! # Printer Module
//!
//! This module provides printer-specific configurations.
//!
//! ## Modules
//!
//! - [`config`]: Protocol constants and hardware specifications

pub mod config;

pub use config::{PRINTING_SERVICE_UUIDS, PrinterConfig};
