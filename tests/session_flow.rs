//! # Session Flow Tests
//!
//! Drive a [`PrinterSession`] end to end over a simulated printer that
//! answers every request on the event channel, the way the btleplug backend
//! does.

use std::time::Duration;

use image::{DynamicImage, Rgba, RgbaImage};
use pretty_assertions::assert_eq;
use thermoble::discovery::DiscoveredDevice;
use thermoble::printer::PRINTING_SERVICE_UUIDS;
use thermoble::render;
use thermoble::session::{BitmapProvider, PrintPayload, driver};
use thermoble::transport::{CharacteristicInfo, PeripheralId, Transport, TransportEvent};
use thermoble::{PrinterConfig, PrinterSession, SessionError, ThermobleError};
use tokio::sync::mpsc;
use uuid::Uuid;

const PRINTER: &str = "AA:BB";
const WRITE_CHAR: Uuid = Uuid::from_u128(0x0000_2af1_0000_1000_8000_0080_5f9b_34fb);

// ============================================================================
// SIMULATED PRINTER
// ============================================================================

struct SimulatedPrinter {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    /// Advertisements sent when a scan starts
    nearby: Vec<DiscoveredDevice>,
    services: Vec<Uuid>,
    authorized: bool,
    /// Drop the event channel instead of answering `connect`
    vanish_on_connect: bool,
    writes: Vec<Vec<u8>>,
    disconnects: Vec<(PeripheralId, Duration)>,
}

impl SimulatedPrinter {
    fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let printer = Self {
            events: Some(tx),
            nearby: vec![
                DiscoveredDevice::named("11:22", "headphones"),
                DiscoveredDevice::new("33:44", None),
                DiscoveredDevice::named(PRINTER, "MTP-II"),
            ],
            services: vec![Uuid::from_u128(0x1234), PRINTING_SERVICE_UUIDS[0]],
            authorized: true,
            vanish_on_connect: false,
            writes: Vec::new(),
            disconnects: Vec::new(),
        };
        (printer, rx)
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn written(&self) -> Vec<u8> {
        self.writes.concat()
    }
}

impl Transport for SimulatedPrinter {
    fn is_authorized(&self) -> bool {
        self.authorized
    }

    fn start_scan(&mut self) -> Result<(), ThermobleError> {
        for device in &self.nearby {
            self.emit(TransportEvent::Discovered(device.clone()));
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), ThermobleError> {
        Ok(())
    }

    fn connect(&mut self, id: &PeripheralId) -> Result<(), ThermobleError> {
        if self.vanish_on_connect {
            self.events = None;
        } else {
            self.emit(TransportEvent::Connected(id.clone()));
        }
        Ok(())
    }

    fn discover_services(&mut self, id: &PeripheralId) -> Result<(), ThermobleError> {
        self.emit(TransportEvent::ServicesDiscovered {
            id: id.clone(),
            services: self.services.clone(),
        });
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        id: &PeripheralId,
        service: Uuid,
    ) -> Result<(), ThermobleError> {
        self.emit(TransportEvent::CharacteristicsDiscovered {
            id: id.clone(),
            service,
            characteristics: vec![CharacteristicInfo::write_without_response(WRITE_CHAR)],
        });
        Ok(())
    }

    fn write_without_response(
        &mut self,
        id: &PeripheralId,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), ThermobleError> {
        assert_eq!(characteristic, WRITE_CHAR);
        self.writes.push(data.to_vec());
        self.emit(TransportEvent::WriteReady(id.clone()));
        Ok(())
    }

    fn disconnect(&mut self, id: &PeripheralId, delay: Duration) -> Result<(), ThermobleError> {
        self.disconnects.push((id.clone(), delay));
        Ok(())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn checkerboard(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    }))
}

fn provider(width_dots: u32, image: DynamicImage) -> BitmapProvider {
    Box::new(move |_| Ok(PrintPayload::new(width_dots, image.clone())))
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_prints_in_order_and_disconnects_once() {
    let (printer, mut events) = SimulatedPrinter::new();
    let mut session = PrinterSession::new(printer, PrinterConfig::default());
    let image = checkerboard(64, 40);
    let expected = render::encode(&image, 256).unwrap();

    let report = driver::print_and_wait(
        &mut session,
        &mut events,
        PeripheralId::from(PRINTER),
        provider(256, image),
    )
    .await
    .unwrap();

    let printer = session.transport();
    assert_eq!(printer.writes.len(), expected.len().div_ceil(32));
    assert!(printer.writes.iter().all(|w| w.len() <= 32));
    assert!(printer.writes[..printer.writes.len() - 1].iter().all(|w| w.len() == 32));
    assert_eq!(printer.written(), expected);
    assert_eq!(
        printer.disconnects,
        vec![(PeripheralId::from(PRINTER), Duration::from_secs(1))]
    );

    assert_eq!(report.bytes, expected.len());
    assert_eq!(report.chunks, printer.writes.len());
    assert!(report.warnings.is_empty());
    assert!(session.is_idle());
}

#[tokio::test]
async fn test_header_matches_print_width() {
    let (printer, mut events) = SimulatedPrinter::new();
    let mut session = PrinterSession::new(printer, PrinterConfig::default());

    driver::print_and_wait(
        &mut session,
        &mut events,
        PeripheralId::from(PRINTER),
        provider(256, checkerboard(100, 50)),
    )
    .await
    .unwrap();

    let written = session.transport().written();
    // ESC @, then GS v 0 with 32 bytes per row and 128 + 100 rows
    assert_eq!(
        &written[..10],
        &[0x1B, 0x40, 0x1D, 0x76, 0x30, 0x00, 32, 0, 228, 0]
    );
    assert_eq!(written.len(), 10 + 32 * 228);
}

#[tokio::test]
async fn test_service_not_found_then_retry_succeeds() {
    let (mut printer, mut events) = SimulatedPrinter::new();
    printer.services = vec![Uuid::from_u128(0x1234)];
    let mut session = PrinterSession::new(printer, PrinterConfig::default());

    let result = driver::print_and_wait(
        &mut session,
        &mut events,
        PeripheralId::from(PRINTER),
        provider(384, checkerboard(8, 8)),
    )
    .await;
    assert_eq!(result, Err(SessionError::ServiceNotFound));
    assert!(session.is_idle());
    assert!(session.transport().writes.is_empty());
    assert_eq!(session.transport().disconnects.len(), 1);

    session.transport_mut().services = vec![PRINTING_SERVICE_UUIDS[1]];
    let report = driver::print_and_wait(
        &mut session,
        &mut events,
        PeripheralId::from(PRINTER),
        provider(384, checkerboard(8, 8)),
    )
    .await
    .unwrap();
    assert_eq!(report.chunks, session.transport().writes.len());
    assert!(report.chunks > 0);
}

#[tokio::test]
async fn test_provider_warning_is_reported() {
    let (printer, mut events) = SimulatedPrinter::new();
    let mut session = PrinterSession::new(printer, PrinterConfig::default());
    let image = checkerboard(16, 16);

    let report = driver::print_and_wait(
        &mut session,
        &mut events,
        PeripheralId::from(PRINTER),
        Box::new(move |_| {
            Ok(PrintPayload::new(384, image.clone()).with_warning("Low battery"))
        }),
    )
    .await
    .unwrap();

    assert_eq!(report.warnings, vec!["Low battery".to_string()]);
}

#[tokio::test]
async fn test_missing_printer_exhausts_scan_budget() {
    let (mut printer, mut events) = SimulatedPrinter::new();
    printer.nearby = (0..10)
        .map(|i| DiscoveredDevice::named(format!("00:{:02X}", i), "other"))
        .collect();
    let config = PrinterConfig {
        scan_budget: 5,
        ..PrinterConfig::default()
    };
    let mut session = PrinterSession::new(printer, config);

    let result = driver::print_and_wait(
        &mut session,
        &mut events,
        PeripheralId::from(PRINTER),
        provider(384, checkerboard(8, 8)),
    )
    .await;

    assert_eq!(result, Err(SessionError::DeviceNotFound));
    assert!(session.transport().disconnects.is_empty());
}

#[tokio::test]
async fn test_bad_width_fails_image_generation() {
    let (printer, mut events) = SimulatedPrinter::new();
    let mut session = PrinterSession::new(printer, PrinterConfig::default());

    let result = driver::print_and_wait(
        &mut session,
        &mut events,
        PeripheralId::from(PRINTER),
        provider(100, checkerboard(8, 8)),
    )
    .await;

    assert!(matches!(result, Err(SessionError::ImageGenerationFailed(_))));
    assert!(session.transport().writes.is_empty());
    assert_eq!(session.transport().disconnects.len(), 1);
}

#[tokio::test]
async fn test_permission_denied_creates_no_job() {
    let (mut printer, mut events) = SimulatedPrinter::new();
    printer.authorized = false;
    let mut session = PrinterSession::new(printer, PrinterConfig::default());

    let result = driver::print_and_wait(
        &mut session,
        &mut events,
        PeripheralId::from(PRINTER),
        provider(384, checkerboard(8, 8)),
    )
    .await;

    assert_eq!(result, Err(SessionError::PermissionDenied));
    assert!(session.is_idle());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_closed_event_channel_is_connection_lost() {
    let (mut printer, mut events) = SimulatedPrinter::new();
    printer.vanish_on_connect = true;
    let mut session = PrinterSession::new(printer, PrinterConfig::default());

    let result = driver::print_and_wait(
        &mut session,
        &mut events,
        PeripheralId::from(PRINTER),
        provider(384, checkerboard(8, 8)),
    )
    .await;

    assert_eq!(result, Err(SessionError::ConnectionLost));
    assert!(session.is_idle());
}
