//! # Printer Session
//!
//! The state machine that takes one print job from "scan for this address"
//! to "all bytes written, disconnect".
//!
//! ## Phases
//!
//! ```text
//! Idle ─► Scanning ─► Connecting ─► DiscoveringServices ─► DiscoveringCharacteristics
//!   ▲                                                                  │
//!   │                                                                  ▼
//!   └──── Closing ◄──────────── Transferring ◄──────────────── GeneratingImage
//!
//! Any phase ── failure ──► (report once, disconnect) ──► Idle
//! ```
//!
//! ## Driving
//!
//! The session never blocks. Requests go out through a [`Transport`] and the
//! session parks in an intermediate phase until the matching
//! [`TransportEvent`] is passed to [`PrinterSession::handle_event`]. Each
//! call returns the [`SessionNotice`]s it produced instead of invoking
//! stored callbacks. [`driver::run`] wires this to an event channel.
//!
//! Events for another peripheral, or that the current phase does not expect,
//! are dropped. After [`PrinterSession::reset`] every late event is a no-op.
//!
//! ## Flow Control
//!
//! Exactly one write is outstanding at a time: the next chunk goes out only
//! on [`TransportEvent::WriteReady`].

pub mod driver;

use image::DynamicImage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SessionError, ThermobleError};
use crate::printer::PrinterConfig;
use crate::render::raster::{self, EncodeOptions};
use crate::transport::{
    CharacteristicInfo, PeripheralId, TransferBuffer, Transport, TransportEvent,
};

pub use driver::PrintReport;

/// What a bitmap provider hands back once a printer is ready.
#[derive(Debug, Clone, Default)]
pub struct PrintPayload {
    /// Print width in dots, a positive multiple of 8
    pub width_dots: u32,
    /// The image to print. `None` aborts the job.
    pub image: Option<DynamicImage>,
    /// Non-fatal message reported alongside the job
    pub warning: Option<String>,
}

impl PrintPayload {
    pub fn new(width_dots: u32, image: DynamicImage) -> Self {
        Self {
            width_dots,
            image: Some(image),
            warning: None,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Called once per job, after a writable characteristic was found.
///
/// An `Err` is an unexpected provider failure and ends the job with
/// [`SessionError::UnknownError`].
pub type BitmapProvider = Box<dyn FnMut(&PeripheralId) -> Result<PrintPayload, String> + Send>;

/// Session phase. Failures are not a phase: they are reported and the
/// session is back in `Idle` before `handle_event` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    GeneratingImage,
    Transferring,
    Closing,
}

/// Reported by [`PrinterSession::handle_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Non-fatal provider message; the job continues.
    Warning(String),
    /// The job ended in failure. The session is idle again.
    Failed(SessionError),
    /// Every byte was written and a delayed disconnect was scheduled.
    Completed { bytes: usize, chunks: usize },
}

struct PrintJob {
    target: PeripheralId,
    provider: BitmapProvider,
    scan_budget: u32,
}

/// Everything that belongs to the current job. Replaced wholesale on
/// every new job and every terminal transition.
#[derive(Default)]
struct SessionState {
    phase: Phase,
    job: Option<PrintJob>,
    peripheral: Option<PeripheralId>,
    service: Option<Uuid>,
    characteristic: Option<Uuid>,
    buffer: Option<TransferBuffer>,
    chunks_written: usize,
}

/// # Printer Session Controller
///
/// Owns its transport and at most one live print job.
///
/// ## Example
///
/// ```ignore
/// let mut session = PrinterSession::new(transport, PrinterConfig::default());
/// session.print_image("AA:BB:CC:DD:EE:FF".into(), provider)?;
/// for event in events {
///     for notice in session.handle_event(event) { /* ... */ }
/// }
/// ```
pub struct PrinterSession<T: Transport> {
    transport: T,
    config: PrinterConfig,
    state: SessionState,
}

impl<T: Transport> PrinterSession<T> {
    pub fn new(transport: T, config: PrinterConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::default(),
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state.phase == Phase::Idle
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// The peripheral of the current job, once it was found.
    pub fn peripheral(&self) -> Option<&PeripheralId> {
        self.state.peripheral.as_ref()
    }

    /// Advertisements left before the scan gives up.
    pub fn scan_budget(&self) -> Option<u32> {
        self.state.job.as_ref().map(|job| job.scan_budget)
    }

    /// `(sent, total)` bytes while transferring.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.state
            .buffer
            .as_ref()
            .map(|b| (b.consumed(), b.consumed() + b.remaining()))
    }

    /// Start a print job for the peripheral at `address`.
    ///
    /// Any job already in flight is discarded first, silently, as with
    /// [`reset`](Self::reset). Without Bluetooth permission no job is created.
    pub fn print_image(
        &mut self,
        address: PeripheralId,
        provider: BitmapProvider,
    ) -> Result<(), SessionError> {
        if !self.transport.is_authorized() {
            warn!("Bluetooth use is not authorized");
            return Err(SessionError::PermissionDenied);
        }
        if !self.is_idle() {
            debug!("Discarding job in phase {:?} for new job", self.state.phase);
            self.reset();
        }

        info!("Starting print job for {}", address);
        self.state = SessionState {
            phase: Phase::Scanning,
            job: Some(PrintJob {
                target: address,
                provider,
                scan_budget: self.config.scan_budget,
            }),
            ..SessionState::default()
        };

        if let Err(e) = self.transport.start_scan() {
            self.state = SessionState::default();
            return Err(SessionError::UnknownError(format!("Failed to start scan: {}", e)));
        }
        Ok(())
    }

    /// Cancel the current job without reporting an error.
    ///
    /// Safe in any phase. Stops a running scan, cancels a pending connection
    /// or disconnects, and drops the job so late events are ignored.
    pub fn reset(&mut self) {
        if !self.is_idle() {
            info!("Cancelling print job in phase {:?}", self.state.phase);
        }
        self.teardown();
    }

    /// Alias of [`reset`](Self::reset) for owners that are going away.
    pub fn stop(&mut self) {
        self.reset();
    }

    /// Advance the state machine with one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) -> Vec<SessionNotice> {
        if self.is_idle() {
            return Vec::new();
        }

        match (self.state.phase, event) {
            (Phase::Scanning, TransportEvent::Discovered(device)) => {
                self.on_advertisement(device.id)
            }
            (_, event) if !self.is_current_peripheral(event.peripheral()) => {
                debug!("Ignoring event for other peripheral: {:?}", event);
                Vec::new()
            }
            (Phase::Connecting, TransportEvent::Connected(id)) => {
                info!("Connected to {}", id);
                self.state.phase = Phase::DiscoveringServices;
                self.issue("Service discovery", |t| t.discover_services(&id))
            }
            (Phase::Connecting, TransportEvent::ConnectFailed { reason, .. }) => {
                self.fail(SessionError::ConnectionFailed(reason))
            }
            (Phase::DiscoveringServices, TransportEvent::ServicesDiscovered { id, services }) => {
                self.on_services(id, &services)
            }
            (
                Phase::DiscoveringCharacteristics,
                TransportEvent::CharacteristicsDiscovered {
                    service,
                    characteristics,
                    ..
                },
            ) if Some(service) == self.state.service => self.on_characteristics(&characteristics),
            (
                Phase::DiscoveringServices | Phase::DiscoveringCharacteristics,
                TransportEvent::DiscoveryFailed { reason, .. },
            ) => self.fail(SessionError::DiscoveryFailed(reason)),
            (Phase::Transferring, TransportEvent::WriteReady(_)) => self.write_next_chunk(),
            (Phase::Transferring, TransportEvent::WriteFailed { reason, .. }) => {
                self.fail(SessionError::UnknownError(format!("Write failed: {}", reason)))
            }
            (_, TransportEvent::Disconnected(id)) => {
                warn!("{} disconnected in phase {:?}", id, self.state.phase);
                // Already gone, nothing to disconnect.
                self.state.peripheral = None;
                self.fail(SessionError::ConnectionLost)
            }
            (phase, event) => {
                debug!("Ignoring {:?} in phase {:?}", event, phase);
                Vec::new()
            }
        }
    }

    fn is_current_peripheral(&self, id: &PeripheralId) -> bool {
        self.state.peripheral.as_ref() == Some(id)
    }

    fn on_advertisement(&mut self, id: PeripheralId) -> Vec<SessionNotice> {
        let Some(job) = self.state.job.as_mut() else {
            return self.fail(SessionError::UnknownError("Scanning without a job".to_string()));
        };

        if id == job.target && self.state.peripheral.is_none() {
            info!("Found printer {}, connecting", id);
            if let Err(e) = self.transport.stop_scan() {
                debug!("stop_scan failed: {}", e);
            }
            self.state.phase = Phase::Connecting;
            self.state.peripheral = Some(id.clone());
            return self.issue("Connect", |t| t.connect(&id));
        }

        job.scan_budget = job.scan_budget.saturating_sub(1);
        if job.scan_budget == 0 {
            warn!("Scan budget exhausted looking for {}", job.target);
            return self.fail(SessionError::DeviceNotFound);
        }
        Vec::new()
    }

    fn on_services(&mut self, id: PeripheralId, services: &[Uuid]) -> Vec<SessionNotice> {
        let allowed = &self.config.service_uuids;
        let Some(service) = services.iter().copied().find(|s| allowed.contains(s)) else {
            warn!("No printing service among {} services", services.len());
            return self.fail(SessionError::ServiceNotFound);
        };

        debug!("Using printing service {}", service);
        self.state.service = Some(service);
        self.state.phase = Phase::DiscoveringCharacteristics;
        self.issue("Characteristic discovery", |t| {
            t.discover_characteristics(&id, service)
        })
    }

    fn on_characteristics(&mut self, characteristics: &[CharacteristicInfo]) -> Vec<SessionNotice> {
        let Some(characteristic) = characteristics
            .iter()
            .find(|c| c.properties.write_without_response)
        else {
            warn!("No write-without-response characteristic");
            return self.fail(SessionError::CharacteristicNotFound);
        };

        debug!("Using characteristic {}", characteristic.uuid);
        self.state.characteristic = Some(characteristic.uuid);
        self.state.phase = Phase::GeneratingImage;
        self.generate_image()
    }

    fn generate_image(&mut self) -> Vec<SessionNotice> {
        let (Some(job), Some(peripheral)) = (self.state.job.as_mut(), self.state.peripheral.as_ref())
        else {
            return self.fail(SessionError::UnknownError(
                "No job or peripheral while generating image".to_string(),
            ));
        };

        let payload = match (job.provider)(peripheral) {
            Ok(payload) => payload,
            Err(e) => return self.fail(SessionError::UnknownError(e)),
        };

        let mut notices = Vec::new();
        if let Some(warning) = payload.warning {
            warn!("Provider warning: {}", warning);
            notices.push(SessionNotice::Warning(warning));
        }

        let Some(image) = payload.image else {
            notices.extend(self.fail(SessionError::ImageGenerationFailed(
                "Provider returned no image".to_string(),
            )));
            return notices;
        };

        match self.encode(&image, payload.width_dots) {
            Ok(bytes) => {
                info!(
                    "Encoded {}x{} image into {} bytes",
                    image.width(),
                    image.height(),
                    bytes.len()
                );
                self.state.buffer = Some(TransferBuffer::new(bytes));
                self.state.phase = Phase::Transferring;
                notices.extend(self.write_next_chunk());
            }
            Err(e) => {
                notices.extend(self.fail(SessionError::ImageGenerationFailed(e.to_string())));
            }
        }
        notices
    }

    fn encode(&self, image: &DynamicImage, width_dots: u32) -> Result<Vec<u8>, ThermobleError> {
        if width_dots == 0 || width_dots % 8 != 0 {
            return Err(ThermobleError::Image(format!(
                "Print width must be a positive multiple of 8, got {}",
                width_dots
            )));
        }
        raster::encode_with(image, width_dots, &EncodeOptions::from(&self.config))
    }

    fn write_next_chunk(&mut self) -> Vec<SessionNotice> {
        let (Some(peripheral), Some(characteristic)) =
            (self.state.peripheral.clone(), self.state.characteristic)
        else {
            return self.fail(SessionError::UnknownError(
                "Write without a connected characteristic".to_string(),
            ));
        };
        let Some(buffer) = self.state.buffer.as_mut() else {
            return self.fail(SessionError::UnknownError("Write without data".to_string()));
        };

        match buffer.extract(self.config.chunk_size) {
            Some(chunk) => {
                let result = self
                    .transport
                    .write_without_response(&peripheral, characteristic, chunk);
                match result {
                    Ok(()) => {
                        self.state.chunks_written += 1;
                        Vec::new()
                    }
                    Err(e) => self.fail(SessionError::UnknownError(format!("Write failed: {}", e))),
                }
            }
            None => self.finish(peripheral),
        }
    }

    fn finish(&mut self, peripheral: PeripheralId) -> Vec<SessionNotice> {
        self.state.phase = Phase::Closing;
        let bytes = self.state.buffer.as_ref().map_or(0, TransferBuffer::consumed);
        let chunks = self.state.chunks_written;
        info!("Sent {} bytes in {} chunks, closing", bytes, chunks);

        // Give the printer time to drain its buffer before dropping the link.
        if let Err(e) = self
            .transport
            .disconnect(&peripheral, self.config.drain_delay())
        {
            warn!("Failed to schedule disconnect: {}", e);
        }
        self.state = SessionState::default();
        vec![SessionNotice::Completed { bytes, chunks }]
    }

    fn issue<F>(&mut self, what: &str, request: F) -> Vec<SessionNotice>
    where
        F: FnOnce(&mut T) -> Result<(), ThermobleError>,
    {
        match request(&mut self.transport) {
            Ok(()) => Vec::new(),
            Err(e) => self.fail(SessionError::UnknownError(format!("{} failed: {}", what, e))),
        }
    }

    fn fail(&mut self, error: SessionError) -> Vec<SessionNotice> {
        warn!("Print job failed in phase {:?}: {}", self.state.phase, error);
        self.teardown();
        vec![SessionNotice::Failed(error)]
    }

    fn teardown(&mut self) {
        if self.state.phase == Phase::Scanning {
            if let Err(e) = self.transport.stop_scan() {
                debug!("stop_scan failed: {}", e);
            }
        }
        if let Some(peripheral) = self.state.peripheral.take() {
            if let Err(e) = self.transport.disconnect(&peripheral, std::time::Duration::ZERO) {
                debug!("disconnect failed: {}", e);
            }
        }
        self.state = SessionState::default();
    }
}

// ============================================================================
// TESTS
// ============================================================================
