//! # Device Discovery
//!
//! Turns the raw advertisement stream (which repeats every device many
//! times per second) into a stable, ordered list of named peripherals the
//! user can pick a printer from.
//!
//! ## Rules
//!
//! - Advertisements without a name are ignored
//! - The first advertisement of an id appends it; later ones are ignored
//! - Every subscriber is notified once per new device
//!
//! [`scan`] runs a timed scan on any [`Transport`] and feeds the tracker.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use crate::error::ThermobleError;
use crate::transport::{PeripheralId, Transport, TransportEvent};

/// A peripheral seen while scanning. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub id: PeripheralId,
    /// Advertised local name, `None` when absent or empty
    pub name: Option<String>,
}

impl DiscoveredDevice {
    pub fn new(id: impl Into<PeripheralId>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.filter(|n| !n.is_empty()),
        }
    }

    pub fn named(id: impl Into<PeripheralId>, name: &str) -> Self {
        Self::new(id, Some(name.to_string()))
    }
}

/// Deduplicating, insertion-ordered device list.
#[derive(Debug, Default)]
pub struct DeviceDiscoveryTracker {
    devices: Vec<DiscoveredDevice>,
    subscribers: Vec<mpsc::UnboundedSender<DiscoveredDevice>>,
}

impl DeviceDiscoveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every device. Called when a new scan starts.
    pub fn reset(&mut self) {
        self.devices.clear();
    }

    /// Record an advertisement. Returns `true` when it added a new device.
    pub fn on_advertisement(&mut self, candidate: DiscoveredDevice) -> bool {
        let Some(name) = candidate.name.as_deref() else {
            return false;
        };
        if name.is_empty() || self.contains(&candidate.id) {
            return false;
        }

        debug!("Discovered new device: {} ({})", candidate.id, name);
        self.subscribers
            .retain(|tx| tx.send(candidate.clone()).is_ok());
        self.devices.push(candidate);
        true
    }

    /// Snapshot of the devices in discovery order.
    pub fn list(&self) -> Vec<DiscoveredDevice> {
        self.devices.clone()
    }

    pub fn contains(&self, id: &PeripheralId) -> bool {
        self.devices.iter().any(|d| &d.id == id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Receive every device added from now on ("new device" notification).
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DiscoveredDevice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }
}

/// Scan for `duration`, recording every named device in `tracker`.
///
/// The tracker is reset first. The scan also ends early if the event
/// channel closes.
pub async fn scan<T: Transport>(
    transport: &mut T,
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    tracker: &mut DeviceDiscoveryTracker,
    duration: Duration,
) -> Result<(), ThermobleError> {
    tracker.reset();
    transport.start_scan()?;
    info!("Scanning for {:?}", duration);

    let deadline = Instant::now() + duration;
    while let Ok(Some(event)) = timeout_at(deadline, events.recv()).await {
        if let TransportEvent::Discovered(device) = event {
            tracker.on_advertisement(device);
        }
    }

    transport.stop_scan()?;
    info!("Scan finished, {} devices found", tracker.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;

    #[test]
    fn test_ignores_nameless() {
        let mut tracker = DeviceDiscoveryTracker::new();
        assert!(!tracker.on_advertisement(DiscoveredDevice::new("AA", None)));
        assert!(!tracker.on_advertisement(DiscoveredDevice::new("BB", Some(String::new()))));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_dedups_by_id_and_keeps_order() {
        let mut tracker = DeviceDiscoveryTracker::new();
        assert!(tracker.on_advertisement(DiscoveredDevice::named("B", "printer-b")));
        assert!(tracker.on_advertisement(DiscoveredDevice::named("A", "printer-a")));
        assert!(!tracker.on_advertisement(DiscoveredDevice::named("B", "renamed")));

        let ids: Vec<_> = tracker.list().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![PeripheralId::from("B"), PeripheralId::from("A")]);
        assert_eq!(tracker.list()[0].name.as_deref(), Some("printer-b"));
    }

    #[test]
    fn test_nameless_then_named_is_added() {
        let mut tracker = DeviceDiscoveryTracker::new();
        tracker.on_advertisement(DiscoveredDevice::new("A", None));
        assert!(tracker.on_advertisement(DiscoveredDevice::named("A", "late name")));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_notifies_once_per_device() {
        let mut tracker = DeviceDiscoveryTracker::new();
        let mut rx = tracker.subscribe();

        for _ in 0..3 {
            tracker.on_advertisement(DiscoveredDevice::named("A", "a"));
        }
        tracker.on_advertisement(DiscoveredDevice::named("B", "b"));

        assert_eq!(rx.try_recv().unwrap().id.as_str(), "A");
        assert_eq!(rx.try_recv().unwrap().id.as_str(), "B");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut tracker = DeviceDiscoveryTracker::new();
        drop(tracker.subscribe());
        assert!(tracker.on_advertisement(DiscoveredDevice::named("A", "a")));
        assert!(tracker.subscribers.is_empty());
    }

    #[test]
    fn test_reset_clears() {
        let mut tracker = DeviceDiscoveryTracker::new();
        tracker.on_advertisement(DiscoveredDevice::named("A", "a"));
        tracker.reset();
        assert!(tracker.list().is_empty());
        assert!(tracker.on_advertisement(DiscoveredDevice::named("A", "a")));
    }

    #[test]
    fn test_random_replay_has_no_duplicates() {
        let mut rng = rand::rng();
        let mut tracker = DeviceDiscoveryTracker::new();
        let mut named_ids = HashSet::new();

        for _ in 0..500 {
            let id = format!("{:02X}", rng.random_range(0..40u8));
            let name = if rng.random_bool(0.7) {
                Some(format!("dev-{}", id))
            } else {
                None
            };
            if name.is_some() {
                named_ids.insert(id.clone());
            }
            tracker.on_advertisement(DiscoveredDevice::new(id, name));
        }

        let list = tracker.list();
        let unique: HashSet<_> = list.iter().map(|d| d.id.clone()).collect();
        assert_eq!(unique.len(), list.len());
        assert_eq!(list.len(), named_ids.len());
    }

    #[derive(Default)]
    struct ScanOnly {
        scanning: bool,
        scans: usize,
    }

    impl Transport for ScanOnly {
        fn start_scan(&mut self) -> Result<(), ThermobleError> {
            self.scanning = true;
            self.scans += 1;
            Ok(())
        }
        fn stop_scan(&mut self) -> Result<(), ThermobleError> {
            self.scanning = false;
            Ok(())
        }
        fn connect(&mut self, _id: &PeripheralId) -> Result<(), ThermobleError> {
            unreachable!()
        }
        fn discover_services(&mut self, _id: &PeripheralId) -> Result<(), ThermobleError> {
            unreachable!()
        }
        fn discover_characteristics(
            &mut self,
            _id: &PeripheralId,
            _service: uuid::Uuid,
        ) -> Result<(), ThermobleError> {
            unreachable!()
        }
        fn write_without_response(
            &mut self,
            _id: &PeripheralId,
            _characteristic: uuid::Uuid,
            _data: &[u8],
        ) -> Result<(), ThermobleError> {
            unreachable!()
        }
        fn disconnect(&mut self, _id: &PeripheralId, _delay: Duration) -> Result<(), ThermobleError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_scan_collects_until_channel_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for device in [
            DiscoveredDevice::named("A", "a"),
            DiscoveredDevice::new("B", None),
            DiscoveredDevice::named("A", "a"),
            DiscoveredDevice::named("C", "c"),
        ] {
            tx.send(TransportEvent::Discovered(device)).unwrap();
        }
        tx.send(TransportEvent::Disconnected("A".into())).unwrap();
        drop(tx);

        let mut transport = ScanOnly::default();
        let mut tracker = DeviceDiscoveryTracker::new();
        tracker.on_advertisement(DiscoveredDevice::named("OLD", "stale"));

        scan(&mut transport, &mut rx, &mut tracker, Duration::from_secs(30))
            .await
            .unwrap();

        let ids: Vec<_> = tracker.list().into_iter().map(|d| d.id.to_string()).collect();
        assert_eq!(ids, vec!["A", "C"]);
        assert_eq!(transport.scans, 1);
        assert!(!transport.scanning);
    }

    #[tokio::test]
    async fn test_scan_stops_at_deadline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(TransportEvent::Discovered(DiscoveredDevice::named("A", "a")))
            .unwrap();

        let mut transport = ScanOnly::default();
        let mut tracker = DeviceDiscoveryTracker::new();
        scan(&mut transport, &mut rx, &mut tracker, Duration::from_millis(20))
            .await
            .unwrap();

        assert_eq!(tracker.len(), 1);
        assert!(!transport.scanning);
        drop(tx);
    }
}
