//! # ESC/POS Basic Commands
//!
//! The small subset of the ESC/POS command set that BLE receipt printers
//! need for image printing.
//!
//! ## Escape Sequence Structure
//!
//! Commands are byte sequences starting with a prefix byte:
//! - `ESC` (0x1B) for printer control, e.g. `ESC @`
//! - `GS` (0x1D) for graphics, e.g. `GS v 0`
//!
//! ## Byte Order
//!
//! Multi-byte integers use **little-endian** encoding:
//! - `u16` value 0x1234 is sent as bytes `[0x34, 0x12]`

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Graphics and extended command prefix
pub const GS: u8 = 0x1D;

// ============================================================================
// INITIALIZATION COMMANDS
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Resets the printer to its power-on defaults and clears the print buffer.
/// Sent once at the start of every job.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
/// | Decimal | 27 64 |
///
/// ## Example
///
/// ```
/// use thermoble::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

/// Encode a `u16` as little-endian bytes `[low, high]`.
///
/// ```
/// use thermoble::protocol::commands::u16_le;
///
/// assert_eq!(u16_le(0x1234), [0x34, 0x12]);
/// assert_eq!(u16_le(384), [0x80, 0x01]);
/// ```
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [value as u8, (value >> 8) as u8]
}

// ============================================================================
// TESTS
// ============================================================================
