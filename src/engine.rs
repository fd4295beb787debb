//! Synchronous core of a scan session.
//!
//! [`ProximityEngine`] combines the registry, the focus tracker and the radio
//! capability state. It holds no timers; the scan scheduler calls into it in
//! tick order (`begin_tick`, any number of `ingest`, `end_tick`).

use crate::distance;
use crate::focus::{FocusOutcome, FocusTracker};
use crate::radio::{DeviceId, Discovery, RadioState};
use crate::registry::{DeviceRecord, Registry, Trend};
use log::{debug, info, warn};
use serde::Serialize;

/// Presentation copy of one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    pub id: DeviceId,
    pub name: String,
    pub signal_strength: i32,
    pub previous_signal_strength: i32,
    pub calibration_power: i32,
    /// Meters, or the no-reading sentinel
    pub distance_m: f64,
    pub trend: Trend,
    pub last_seen_tick: u64,
}

impl From<&DeviceRecord> for DeviceView {
    fn from(record: &DeviceRecord) -> Self {
        DeviceView {
            id: record.id().clone(),
            name: record.name.clone(),
            signal_strength: record.signal_strength,
            previous_signal_strength: record.previous_signal_strength,
            calibration_power: record.calibration_power,
            distance_m: record.distance(),
            trend: record.trend(),
            last_seen_tick: record.last_seen_tick,
        }
    }
}

impl DeviceView {
    /// Trend for the locate view: always "closer" once the device is within arm's length
    pub fn display_trend(&self) -> Trend {
        if distance::is_reading(self.distance_m) && self.distance_m <= distance::ARRIVED_M {
            Trend::Closer
        } else {
            self.trend
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusView {
    pub id: DeviceId,
    /// None until the focused device is heard
    pub device: Option<DeviceView>,
    /// Present in the registry and refreshed on the current tick
    pub fresh: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub ticks: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub evicted: u64,
}

/// Point-in-time copy of everything the presentation layer shows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineView {
    pub tick: u64,
    pub radio_state: RadioState,
    /// Strongest first
    pub devices: Vec<DeviceView>,
    pub focus: Option<FocusView>,
    pub stats: SessionStats,
}

impl EngineView {
    pub fn capability_error(&self) -> Option<&'static str> {
        self.radio_state.capability_error()
    }

    pub fn device(&self, id: &DeviceId) -> Option<&DeviceView> {
        self.devices.iter().find(|device| &device.id == id)
    }
}

/// What an accepted discovery changed for the focused device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocusChange {
    /// Not the focused device, or its signal did not move
    None,
    /// The focused device was heard for the first time or its signal changed;
    /// carries the new distance
    Moved(f64),
}

#[derive(Debug)]
pub struct ProximityEngine {
    registry: Registry,
    focus: FocusTracker,
    radio_state: RadioState,
    use_advertised_calibration: bool,
    stats: SessionStats,
}

impl Default for ProximityEngine {
    fn default() -> Self {
        ProximityEngine::new(true)
    }
}

impl ProximityEngine {
    pub fn new(use_advertised_calibration: bool) -> Self {
        ProximityEngine {
            registry: Registry::new(),
            focus: FocusTracker::new(),
            radio_state: RadioState::Unknown,
            use_advertised_calibration,
            stats: SessionStats::default(),
        }
    }

    pub fn radio_state(&self) -> RadioState {
        self.radio_state
    }

    /// Record a capability change; returns whether the state actually changed
    pub fn set_radio_state(&mut self, state: RadioState) -> bool {
        if self.radio_state == state {
            return false;
        }
        match state.capability_error() {
            None => info!("Radio powered on, scanning resumes"),
            Some(reason) => warn!("Radio {}: {}, scanning suspended", state.label(), reason),
        }
        self.radio_state = state;
        true
    }

    /// Open a new tick; returns its index
    pub fn begin_tick(&mut self) -> u64 {
        self.stats.ticks += 1;
        self.registry.advance_tick()
    }

    /// Close the current tick by sweeping stale devices
    pub fn end_tick(&mut self) -> Vec<DeviceRecord> {
        let evicted = self.registry.sweep();
        for record in &evicted {
            info!(
                "Evicted {} ({}) last seen at tick {}",
                record.name,
                record.id(),
                record.last_seen_tick
            );
        }
        self.stats.evicted += evicted.len() as u64;
        evicted
    }

    /// Apply one discovery; invalid samples are counted and dropped
    pub fn ingest(&mut self, mut discovery: Discovery) -> FocusChange {
        if !self.use_advertised_calibration {
            discovery.calibration_power = None;
        }

        if let Err(e) = self.registry.on_discovery(&discovery) {
            debug!("Discarded sample from {:?}: {}", discovery.id.as_str(), e);
            self.stats.rejected += 1;
            return FocusChange::None;
        }
        self.stats.accepted += 1;

        let tick = self.registry.current_tick();
        let first_sighting = self.focus.is_active() && self.focus.record().is_none();
        match self.focus.observe(&discovery, tick) {
            Some(record)
                if first_sighting || record.signal_strength != record.previous_signal_strength =>
            {
                FocusChange::Moved(record.distance())
            }
            _ => FocusChange::None,
        }
    }

    /// Focus on `id`; returns the current distance when the device is already known
    pub fn set_focus(&mut self, id: DeviceId) -> Option<f64> {
        self.focus
            .set_focus(id, &self.registry)
            .map(DeviceRecord::distance)
    }

    pub fn clear_focus(&mut self) -> Option<FocusOutcome> {
        self.focus.clear_focus(&self.registry)
    }

    pub fn focused_id(&self) -> Option<&DeviceId> {
        self.focus.focused_id()
    }

    /// Distance to the focused device, if it has been heard
    pub fn focus_distance(&self) -> Option<f64> {
        self.focus.record().map(DeviceRecord::distance)
    }

    pub fn current_tick(&self) -> u64 {
        self.registry.current_tick()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn snapshot_sorted(&self) -> Vec<DeviceView> {
        self.registry
            .snapshot_sorted()
            .iter()
            .map(DeviceView::from)
            .collect()
    }

    pub fn view(&self) -> EngineView {
        let focus = self.focus.focused_id().map(|id| {
            let record = self.focus.record();
            FocusView {
                id: id.clone(),
                device: record.map(DeviceView::from),
                fresh: self.registry.contains(id)
                    && record.is_some_and(|r| r.last_seen_tick == self.registry.current_tick()),
            }
        });

        EngineView {
            tick: self.registry.current_tick(),
            radio_state: self.radio_state,
            devices: self.snapshot_sorted(),
            focus,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_ticks(engine: &mut ProximityEngine, n: u64) {
        for _ in 0..n {
            engine.end_tick();
            engine.begin_tick();
        }
    }

    #[test]
    fn test_eviction_scenario() {
        let mut engine = ProximityEngine::default();

        engine.begin_tick(); // 1
        engine.ingest(Discovery::new("A", -60).with_calibration(-59));
        engine.end_tick();
        let view = engine.view();
        assert_eq!(view.devices.len(), 1);
        assert!((view.devices[0].distance_m - 0.930).abs() < 0.001);

        for tick in 2..=3 {
            assert_eq!(engine.begin_tick(), tick);
            assert!(engine.end_tick().is_empty(), "evicted during grace at tick {tick}");
        }

        assert_eq!(engine.begin_tick(), 4);
        assert_eq!(engine.end_tick().len(), 1);
        assert!(engine.view().devices.is_empty());
        assert_eq!(engine.view().stats.evicted, 1);
    }

    #[test]
    fn test_focus_loss_scenario() {
        let mut engine = ProximityEngine::default();
        engine.begin_tick();
        run_ticks(&mut engine, 3); // now at tick 4
        engine.ingest(Discovery::new("B", -70));
        assert!(engine.set_focus("B".into()).is_some());

        run_ticks(&mut engine, 1); // tick 5
        assert_eq!(engine.current_tick(), 5);
        engine.ingest(Discovery::new("B", -68));
        assert!(!engine.clear_focus().unwrap().lost);

        engine.set_focus("B".into());
        run_ticks(&mut engine, 1); // tick 6, B not refreshed
        assert!(engine.clear_focus().unwrap().lost);
    }

    #[test]
    fn test_focus_change_reports_only_moves() {
        let mut engine = ProximityEngine::default();
        engine.begin_tick();
        engine.set_focus("B".into());

        // First sighting of a focused device arms feedback even though previous == current
        assert!(matches!(
            engine.ingest(Discovery::new("B", -70)),
            FocusChange::Moved(_)
        ));
        assert_eq!(engine.ingest(Discovery::new("B", -70)), FocusChange::None);
        match engine.ingest(Discovery::new("B", -60)) {
            FocusChange::Moved(d) => assert!((d - 0.89976 * (60.0f64 / 59.0).powi(2)).abs() < 1e-9),
            other => panic!("expected a move, got {other:?}"),
        }
        assert_eq!(engine.ingest(Discovery::new("B", -60)), FocusChange::None);
        assert_eq!(engine.ingest(Discovery::new("A", -40)), FocusChange::None);
    }

    #[test]
    fn test_focused_device_outlives_eviction() {
        let mut engine = ProximityEngine::default();
        engine.begin_tick();
        engine.ingest(Discovery::new("B", -70).with_name("Wallet"));
        engine.set_focus("B".into());
        run_ticks(&mut engine, 5);

        let view = engine.view();
        assert!(view.devices.is_empty());
        let focus = view.focus.unwrap();
        assert_eq!(focus.device.unwrap().name, "Wallet");
        assert!(!focus.fresh);
    }

    #[test]
    fn test_invalid_samples_counted() {
        let mut engine = ProximityEngine::default();
        engine.begin_tick();
        engine.ingest(Discovery::new("A", 0));
        engine.ingest(Discovery::new("A", 5));
        engine.ingest(Discovery::new("A", -50));
        let stats = engine.view().stats;
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.accepted, 1);
    }

    #[test]
    fn test_fallback_calibration_policy() {
        let mut engine = ProximityEngine::new(false);
        engine.begin_tick();
        engine.ingest(Discovery::new("A", -59).with_calibration(4));
        let view = engine.view();
        assert_eq!(view.devices[0].calibration_power, -59);
        assert_eq!(view.devices[0].distance_m, 0.89976);
    }

    #[test]
    fn test_positive_tx_power_falls_back() {
        let mut engine = ProximityEngine::new(true);
        engine.begin_tick();
        engine.ingest(Discovery::new("A", -60).with_calibration(4));
        let view = engine.view();
        assert_eq!(view.devices[0].calibration_power, -59);
        assert!((view.devices[0].distance_m - 0.930).abs() < 0.001);
        assert_eq!(view.stats.accepted, 1);
    }

    #[test]
    fn test_radio_state_changes() {
        let mut engine = ProximityEngine::default();
        assert_eq!(engine.radio_state(), RadioState::Unknown);
        assert!(engine.set_radio_state(RadioState::PoweredOn));
        assert!(!engine.set_radio_state(RadioState::PoweredOn));
        assert!(engine.view().capability_error().is_none());
        assert!(engine.set_radio_state(RadioState::PoweredOff));
        assert_eq!(engine.view().capability_error(), Some("Bluetooth is turned off"));
    }

    #[test]
    fn test_display_trend_near_device() {
        let mut engine = ProximityEngine::default();
        engine.begin_tick();
        engine.ingest(Discovery::new("A", -20).with_calibration(-59));
        engine.ingest(Discovery::new("A", -25).with_calibration(-59));
        let device = engine.view().devices[0].clone();
        assert_eq!(device.trend, Trend::Farther);
        assert_eq!(device.display_trend(), Trend::Closer);
    }
}
