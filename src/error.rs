//! # Error Types
//!
//! This module defines error types used throughout the thermoble library.
//!
//! - [`ThermobleError`]: crate-wide error for I/O, transport, image and config failures
//! - [`SessionError`]: the failure kinds a print session reports to its caller

use thiserror::Error;

/// Main error type for thermoble operations
#[derive(Debug, Error)]
pub enum ThermobleError {
    /// Transport-level errors (adapter, connection, GATT I/O)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Image loading or encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// A print session ended in failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// # Print Session Failures
///
/// Every failure is handled inside the session (disconnect, back to idle)
/// and reported exactly once. None of them is fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Bluetooth usage is not authorized. Reported before any scan starts.
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    /// The scan budget ran out without seeing the target address.
    #[error("Printer not found")]
    DeviceNotFound,

    /// None of the allowed printing services is present on the peripheral.
    #[error("Printing service not found")]
    ServiceNotFound,

    /// No characteristic supports write-without-response.
    #[error("No supported write characteristic found")]
    CharacteristicNotFound,

    /// The bitmap provider returned no image, or it could not be encoded.
    #[error("Could not generate print image: {0}")]
    ImageGenerationFailed(String),

    /// The connection attempt was rejected by the transport.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Service or characteristic discovery failed.
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    /// The peripheral disconnected before the job finished.
    #[error("Connection lost")]
    ConnectionLost,

    /// Provider failure or a missing handle where one was required.
    #[error("Unknown error: {0}")]
    UnknownError(String),
}
