//! # Printer Transport Layer
//!
//! The BLE stack is modelled as a request/event pair:
//!
//! - [`Transport`]: fire-and-forget requests (scan, connect, discover, write)
//! - [`TransportEvent`]: the asynchronous results, delivered in order on one
//!   channel
//!
//! ```text
//!   PrinterSession ──request──► Transport ──radio──► printer
//!        ▲                                             │
//!        └──────────────── TransportEvent ◄────────────┘
//! ```
//!
//! ## Available Transports
//!
//! - [`ble`]: btleplug backend (feature `ble`)
//! - [`chunk`]: the chunk buffer used to stream a job

pub mod chunk;

#[cfg(feature = "ble")]
pub mod ble;

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::discovery::DiscoveredDevice;
use crate::error::ThermobleError;

pub use chunk::TransferBuffer;

#[cfg(feature = "ble")]
pub use ble::BleTransport;

/// Opaque, transport-assigned peripheral identifier (a BD address on most
/// platforms).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeripheralId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// GATT characteristic capabilities the session cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
}

/// A discovered GATT characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
}

impl CharacteristicInfo {
    /// A characteristic that only supports write-without-response.
    pub fn write_without_response(uuid: Uuid) -> Self {
        Self {
            uuid,
            properties: CharacteristicProperties {
                write_without_response: true,
                ..Default::default()
            },
        }
    }
}

/// Asynchronous results of [`Transport`] requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An advertisement was received. Duplicates are expected.
    Discovered(DiscoveredDevice),

    Connected(PeripheralId),

    ConnectFailed { id: PeripheralId, reason: String },

    ServicesDiscovered {
        id: PeripheralId,
        services: Vec<Uuid>,
    },

    CharacteristicsDiscovered {
        id: PeripheralId,
        service: Uuid,
        characteristics: Vec<CharacteristicInfo>,
    },

    DiscoveryFailed { id: PeripheralId, reason: String },

    /// The previous write-without-response left the link; the next may be sent.
    WriteReady(PeripheralId),

    /// A write could not be delivered. The link may still be up.
    WriteFailed { id: PeripheralId, reason: String },

    Disconnected(PeripheralId),
}

impl TransportEvent {
    /// The peripheral this event concerns.
    pub fn peripheral(&self) -> &PeripheralId {
        match self {
            TransportEvent::Discovered(device) => &device.id,
            TransportEvent::Connected(id)
            | TransportEvent::WriteReady(id)
            | TransportEvent::Disconnected(id) => id,
            TransportEvent::ConnectFailed { id, .. }
            | TransportEvent::ServicesDiscovered { id, .. }
            | TransportEvent::CharacteristicsDiscovered { id, .. }
            | TransportEvent::DiscoveryFailed { id, .. }
            | TransportEvent::WriteFailed { id, .. } => id,
        }
    }
}

/// # BLE Transport Capability
///
/// Every request returns as soon as it is issued. Its outcome arrives
/// later as a [`TransportEvent`]. An `Err` here means the request could not
/// even be issued (adapter gone, command channel closed).
///
/// Each `write_without_response` is followed by exactly one
/// [`TransportEvent::WriteReady`].
pub trait Transport {
    /// Whether the platform allows this process to use Bluetooth.
    fn is_authorized(&self) -> bool {
        true
    }

    fn start_scan(&mut self) -> Result<(), ThermobleError>;

    /// Stop scanning. A no-op when no scan is running.
    fn stop_scan(&mut self) -> Result<(), ThermobleError>;

    fn connect(&mut self, id: &PeripheralId) -> Result<(), ThermobleError>;

    fn discover_services(&mut self, id: &PeripheralId) -> Result<(), ThermobleError>;

    fn discover_characteristics(
        &mut self,
        id: &PeripheralId,
        service: Uuid,
    ) -> Result<(), ThermobleError>;

    fn write_without_response(
        &mut self,
        id: &PeripheralId,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), ThermobleError>;

    /// Disconnect after `delay`, or cancel a pending connection attempt.
    fn disconnect(&mut self, id: &PeripheralId, delay: Duration) -> Result<(), ThermobleError>;
}
