//! # btleplug BLE Transport
//!
//! Implements [`Transport`] on top of btleplug. A background tokio task owns
//! the adapter:
//!
//! ```text
//! BleTransport ──Command──► backend task ──► btleplug Adapter / Peripheral
//!                                │
//! PrinterSession ◄──TransportEvent┘
//! ```
//!
//! Requests return immediately; their results arrive on the event channel
//! returned by [`BleTransport::new`].
//!
//! ## Identifiers
//!
//! Peripherals are identified by their BD address string
//! (`AA:BB:CC:DD:EE:FF`), so saved printer addresses survive restarts.
//!
//! ## Flow Control
//!
//! Writes are executed one at a time in request order. A
//! [`TransportEvent::WriteReady`] is sent once btleplug has handed a
//! write-without-response to the link.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    CharacteristicInfo, CharacteristicProperties, PeripheralId, Transport, TransportEvent,
};
use crate::discovery::DiscoveredDevice;
use crate::error::ThermobleError;

#[derive(Debug)]
enum Command {
    StartScan,
    StopScan,
    Connect(PeripheralId),
    DiscoverServices(PeripheralId),
    DiscoverCharacteristics(PeripheralId, Uuid),
    Write {
        id: PeripheralId,
        characteristic: Uuid,
        data: Vec<u8>,
    },
    Disconnect(PeripheralId, Duration),
}

/// # BLE Printer Transport
///
/// ## Example
///
/// ```no_run
/// # async fn demo() -> Result<(), thermoble::ThermobleError> {
/// use thermoble::transport::{BleTransport, Transport};
///
/// let (mut transport, mut events) = BleTransport::new().await?;
/// transport.start_scan()?;
/// while let Some(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
pub struct BleTransport {
    commands: mpsc::UnboundedSender<Command>,
}

impl BleTransport {
    /// Open the first BLE adapter and start the backend task.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn new()
    -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), ThermobleError> {
        let manager = Manager::new()
            .await
            .map_err(|e| ThermobleError::Transport(format!("Failed to create BLE manager: {}", e)))?;

        let adapter = manager
            .adapters()
            .await
            .map_err(|e| ThermobleError::Transport(format!("Failed to get BLE adapters: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| ThermobleError::Transport("No BLE adapters available".to_string()))?;

        let central_events = adapter
            .events()
            .await
            .map_err(|e| ThermobleError::Transport(format!("Failed to get BLE events: {}", e)))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let scanning = Arc::new(AtomicBool::new(false));

        tokio::spawn(pump_central_events(
            adapter.clone(),
            central_events,
            event_tx.clone(),
            scanning.clone(),
        ));

        let backend = Backend {
            adapter,
            events: event_tx,
            scanning,
            peripherals: HashMap::new(),
        };
        tokio::spawn(backend.run(command_rx));

        info!("BLE adapter initialized");
        Ok((
            Self {
                commands: command_tx,
            },
            event_rx,
        ))
    }

    fn send(&self, command: Command) -> Result<(), ThermobleError> {
        self.commands
            .send(command)
            .map_err(|_| ThermobleError::Transport("BLE backend stopped".to_string()))
    }
}

impl Transport for BleTransport {
    fn start_scan(&mut self) -> Result<(), ThermobleError> {
        self.send(Command::StartScan)
    }

    fn stop_scan(&mut self) -> Result<(), ThermobleError> {
        self.send(Command::StopScan)
    }

    fn connect(&mut self, id: &PeripheralId) -> Result<(), ThermobleError> {
        self.send(Command::Connect(id.clone()))
    }

    fn discover_services(&mut self, id: &PeripheralId) -> Result<(), ThermobleError> {
        self.send(Command::DiscoverServices(id.clone()))
    }

    fn discover_characteristics(
        &mut self,
        id: &PeripheralId,
        service: Uuid,
    ) -> Result<(), ThermobleError> {
        self.send(Command::DiscoverCharacteristics(id.clone(), service))
    }

    fn write_without_response(
        &mut self,
        id: &PeripheralId,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), ThermobleError> {
        self.send(Command::Write {
            id: id.clone(),
            characteristic,
            data: data.to_vec(),
        })
    }

    fn disconnect(&mut self, id: &PeripheralId, delay: Duration) -> Result<(), ThermobleError> {
        self.send(Command::Disconnect(id.clone(), delay))
    }
}

/// Forward adapter events. Advertisements are only forwarded while a scan
/// is running; disconnects always are.
async fn pump_central_events(
    adapter: Adapter,
    mut central_events: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    scanning: Arc<AtomicBool>,
) {
    while let Some(event) = central_events.next().await {
        let (pid, is_advertisement) = match event {
            CentralEvent::DeviceDiscovered(pid) | CentralEvent::DeviceUpdated(pid) => (pid, true),
            CentralEvent::DeviceDisconnected(pid) => (pid, false),
            _ => continue,
        };
        if is_advertisement && !scanning.load(Ordering::Relaxed) {
            continue;
        }

        let Ok(peripheral) = adapter.peripheral(&pid).await else {
            continue;
        };
        let id = PeripheralId::new(peripheral.address().to_string());

        let event = if is_advertisement {
            let name = match peripheral.properties().await {
                Ok(Some(props)) => props.local_name,
                _ => None,
            };
            TransportEvent::Discovered(DiscoveredDevice::new(id, name))
        } else {
            debug!("{} disconnected", id);
            TransportEvent::Disconnected(id)
        };

        if events.send(event).is_err() {
            break;
        }
    }
}

struct Backend {
    adapter: Adapter,
    events: mpsc::UnboundedSender<TransportEvent>,
    scanning: Arc<AtomicBool>,
    peripherals: HashMap<PeripheralId, Peripheral>,
}

impl Backend {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            debug!("BLE command: {}", command_name(&command));
            match command {
                Command::StartScan => self.start_scan().await,
                Command::StopScan => self.stop_scan().await,
                Command::Connect(id) => self.connect(id).await,
                Command::DiscoverServices(id) => self.discover_services(id).await,
                Command::DiscoverCharacteristics(id, service) => {
                    self.discover_characteristics(id, service)
                }
                Command::Write {
                    id,
                    characteristic,
                    data,
                } => self.write(id, characteristic, &data).await,
                Command::Disconnect(id, delay) => self.disconnect(id, delay).await,
            }
        }
        debug!("BLE backend stopped");
    }

    fn emit(&self, event: TransportEvent) {
        // The receiver is gone only when the owner shut down.
        let _ = self.events.send(event);
    }

    async fn start_scan(&mut self) {
        // Duplicates are forwarded: every advertisement counts against the scan budget.
        match self.adapter.start_scan(ScanFilter::default()).await {
            Ok(()) => {
                self.scanning.store(true, Ordering::Relaxed);
                info!("Started BLE scanning");
            }
            Err(e) => error!("Failed to start BLE scan: {}", e),
        }
    }

    async fn stop_scan(&mut self) {
        if !self.scanning.swap(false, Ordering::Relaxed) {
            return;
        }
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop BLE scan: {}", e);
        }
    }

    /// Look up a peripheral by address, caching it for later commands.
    async fn find(&mut self, id: &PeripheralId) -> Option<Peripheral> {
        if let Some(p) = self.peripherals.get(id) {
            return Some(p.clone());
        }
        let peripherals = self.adapter.peripherals().await.ok()?;
        let found = peripherals
            .into_iter()
            .find(|p| p.address().to_string() == id.as_str())?;
        self.peripherals.insert(id.clone(), found.clone());
        Some(found)
    }

    async fn connect(&mut self, id: PeripheralId) {
        let Some(peripheral) = self.find(&id).await else {
            self.emit(TransportEvent::ConnectFailed {
                id,
                reason: "Peripheral not known to adapter".to_string(),
            });
            return;
        };

        // Connecting can take seconds; keep the command loop free for resets.
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match peripheral.connect().await {
                Ok(()) => TransportEvent::Connected(id),
                Err(e) => TransportEvent::ConnectFailed {
                    id,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    async fn discover_services(&mut self, id: PeripheralId) {
        let Some(peripheral) = self.peripherals.get(&id).cloned() else {
            self.emit(TransportEvent::DiscoveryFailed {
                id,
                reason: "Not connected".to_string(),
            });
            return;
        };

        match peripheral.discover_services().await {
            Ok(()) => {
                let services = peripheral.services().iter().map(|s| s.uuid).collect();
                self.emit(TransportEvent::ServicesDiscovered { id, services });
            }
            Err(e) => self.emit(TransportEvent::DiscoveryFailed {
                id,
                reason: format!("Failed to discover services: {}", e),
            }),
        }
    }

    /// btleplug discovers characteristics together with services, so this
    /// only reads them back.
    fn discover_characteristics(&mut self, id: PeripheralId, service: Uuid) {
        let found = self.peripherals.get(&id).and_then(|p| {
            p.services().into_iter().find(|s| s.uuid == service)
        });

        match found {
            Some(s) => {
                let characteristics = s.characteristics.iter().map(characteristic_info).collect();
                self.emit(TransportEvent::CharacteristicsDiscovered {
                    id,
                    service,
                    characteristics,
                });
            }
            None => self.emit(TransportEvent::DiscoveryFailed {
                id,
                reason: format!("Service {} not found", service),
            }),
        }
    }

    async fn write(&mut self, id: PeripheralId, characteristic: Uuid, data: &[u8]) {
        let target = self.peripherals.get(&id).and_then(|p| {
            p.characteristics()
                .into_iter()
                .find(|c| c.uuid == characteristic)
                .map(|c| (p.clone(), c))
        });
        let Some((peripheral, characteristic)) = target else {
            error!("Write to unknown characteristic {} on {}", characteristic, id);
            self.emit(TransportEvent::WriteFailed {
                id,
                reason: format!("Unknown characteristic {}", characteristic),
            });
            return;
        };

        match peripheral
            .write(&characteristic, data, WriteType::WithoutResponse)
            .await
        {
            Ok(()) => self.emit(TransportEvent::WriteReady(id)),
            Err(e) => {
                error!("Failed to write to characteristic: {}", e);
                self.emit(TransportEvent::WriteFailed {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn disconnect(&mut self, id: PeripheralId, delay: Duration) {
        let Some(peripheral) = self.peripherals.remove(&id) else {
            return;
        };
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = peripheral.disconnect().await {
                warn!("Failed to disconnect from {}: {}", id, e);
            } else {
                info!("Disconnected from {}", id);
            }
        });
    }
}

fn characteristic_info(c: &Characteristic) -> CharacteristicInfo {
    CharacteristicInfo {
        uuid: c.uuid,
        properties: CharacteristicProperties {
            read: c.properties.contains(CharPropFlags::READ),
            write: c.properties.contains(CharPropFlags::WRITE),
            write_without_response: c.properties.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
            notify: c.properties.contains(CharPropFlags::NOTIFY),
        },
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::StartScan => "start_scan",
        Command::StopScan => "stop_scan",
        Command::Connect(_) => "connect",
        Command::DiscoverServices(_) => "discover_services",
        Command::DiscoverCharacteristics(..) => "discover_characteristics",
        Command::Write { .. } => "write",
        Command::Disconnect(..) => "disconnect",
    }
}
