//! Tick-windowed cache of every device heard during the scan session.

use crate::distance::{self, FALLBACK_CALIBRATION_DBM};
use crate::error::SampleError;
use crate::radio::{DeviceId, Discovery};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

/// A record is evicted once it has gone unrefreshed for more than this many ticks
pub const STALENESS_TICKS: u64 = 2;

/// Direction of the most recent signal change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Closer,
    Farther,
    Steady,
}

impl Trend {
    pub fn label(self) -> &'static str {
        match self {
            Trend::Closer => "closer",
            Trend::Farther => "farther",
            Trend::Steady => "steady",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    id: DeviceId,
    pub name: String,
    /// Whether `name` is a generated placeholder
    pub name_is_placeholder: bool,
    pub signal_strength: i32,
    pub previous_signal_strength: i32,
    pub calibration_power: i32,
    pub last_seen_tick: u64,
}

impl DeviceRecord {
    /// Build a record from a first sighting
    ///
    /// The sample must already have passed [`validate`].
    pub fn new(discovery: &Discovery, tick: u64) -> Self {
        let (name, name_is_placeholder) = match non_empty_name(discovery) {
            Some(name) => (name.to_string(), false),
            None => (placeholder_name(&discovery.id), true),
        };

        DeviceRecord {
            id: discovery.id.clone(),
            name,
            name_is_placeholder,
            signal_strength: discovery.signal_strength,
            previous_signal_strength: discovery.signal_strength,
            calibration_power: advertised_calibration(discovery)
                .unwrap_or(FALLBACK_CALIBRATION_DBM),
            last_seen_tick: tick,
        }
    }

    /// Fold a later sighting of the same device into the record
    pub fn refresh(&mut self, discovery: &Discovery, tick: u64) {
        debug_assert_eq!(self.id, discovery.id);

        self.previous_signal_strength = self.signal_strength;
        self.signal_strength = discovery.signal_strength;
        if let Some(calibration) = advertised_calibration(discovery) {
            self.calibration_power = calibration;
        }
        if let Some(name) = non_empty_name(discovery) {
            if self.name_is_placeholder || self.name != name {
                self.name = name.to_string();
                self.name_is_placeholder = false;
            }
        }
        self.last_seen_tick = tick;
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Estimated distance in meters, or [`distance::NO_READING`]
    pub fn distance(&self) -> f64 {
        distance::estimate(Some(self.signal_strength), Some(self.calibration_power))
    }

    /// Signal got stronger with the latest sample
    pub fn is_improving(&self) -> bool {
        self.signal_strength > self.previous_signal_strength
    }

    pub fn trend(&self) -> Trend {
        match self.signal_strength.cmp(&self.previous_signal_strength) {
            std::cmp::Ordering::Greater => Trend::Closer,
            std::cmp::Ordering::Less => Trend::Farther,
            std::cmp::Ordering::Equal => Trend::Steady,
        }
    }
}

/// Reject samples no physical receiver would report
pub fn validate(discovery: &Discovery) -> Result<(), SampleError> {
    if discovery.id.as_str().is_empty() {
        return Err(SampleError::EmptyId);
    }
    match discovery.signal_strength {
        0 => Err(SampleError::ZeroStrength),
        s if s > 0 => Err(SampleError::NonNegativeStrength(s)),
        _ => Ok(()),
    }
}

/// Advertised reference power, if usable
///
/// Transmit power is often reported as 0 or a positive dBm figure, which
/// flips the sign of the signal ratio. Those values count as not advertised.
fn advertised_calibration(discovery: &Discovery) -> Option<i32> {
    discovery.calibration_power.filter(|calibration| *calibration < 0)
}

fn non_empty_name(discovery: &Discovery) -> Option<&str> {
    discovery
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn placeholder_name(id: &DeviceId) -> String {
    format!("Unknown ({})", id.short())
}

#[derive(Debug, Clone)]
struct Entry {
    record: DeviceRecord,
    /// Monotonic insertion order, used to keep ties stable
    seq: u64,
}

/// Every device seen in the current scan session, keyed by id
#[derive(Debug, Default)]
pub struct Registry {
    devices: HashMap<DeviceId, Entry>,
    current_tick: u64,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Start a new scan cycle
    pub fn advance_tick(&mut self) -> u64 {
        self.current_tick += 1;
        self.current_tick
    }

    /// Insert or refresh the record for `discovery.id`, stamped with the current tick
    pub fn on_discovery(&mut self, discovery: &Discovery) -> Result<&DeviceRecord, SampleError> {
        validate(discovery)?;

        let tick = self.current_tick;
        let next_seq = &mut self.next_seq;
        let entry = self
            .devices
            .entry(discovery.id.clone())
            .and_modify(|entry| entry.record.refresh(discovery, tick))
            .or_insert_with(|| {
                debug!("New device {} at tick {}", discovery.id, tick);
                let seq = *next_seq;
                *next_seq += 1;
                Entry {
                    record: DeviceRecord::new(discovery, tick),
                    seq,
                }
            });

        Ok(&entry.record)
    }

    /// Drop every record not refreshed within the staleness window
    pub fn sweep(&mut self) -> Vec<DeviceRecord> {
        let tick = self.current_tick;
        let stale: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|(_, entry)| tick.saturating_sub(entry.record.last_seen_tick) > STALENESS_TICKS)
            .map(|(id, _)| id.clone())
            .collect();

        let mut evicted: Vec<(u64, DeviceRecord)> = stale
            .iter()
            .filter_map(|id| self.devices.remove(id))
            .map(|entry| (entry.seq, entry.record))
            .collect();
        evicted.sort_by_key(|(seq, _)| *seq);

        evicted.into_iter().map(|(_, record)| record).collect()
    }

    /// Devices strongest first; equal strengths keep insertion order
    pub fn snapshot_sorted(&self) -> Vec<DeviceRecord> {
        let mut entries: Vec<&Entry> = self.devices.values().collect();
        entries.sort_by(|a, b| {
            b.record
                .signal_strength
                .cmp(&a.record.signal_strength)
                .then(a.seq.cmp(&b.seq))
        });
        entries.into_iter().map(|entry| entry.record.clone()).collect()
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.devices.get(id).map(|entry| &entry.record)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen(registry: &mut Registry, id: &str, rssi: i32) {
        registry.on_discovery(&Discovery::new(id, rssi)).unwrap();
    }

    #[test]
    fn test_previous_signal_tracks_prior_sample() {
        let mut registry = Registry::new();
        registry.advance_tick();
        seen(&mut registry, "A", -70);

        let record = registry.get(&"A".into()).unwrap();
        assert_eq!(record.previous_signal_strength, -70);

        for (before, now) in [(-70, -65), (-65, -80), (-80, -80), (-80, -55)] {
            registry.advance_tick();
            seen(&mut registry, "A", now);
            let record = registry.get(&"A".into()).unwrap();
            assert_eq!(record.previous_signal_strength, before);
            assert_eq!(record.signal_strength, now);
        }
    }

    #[test]
    fn test_new_record_is_stamped_with_current_tick() {
        let mut registry = Registry::new();
        registry.advance_tick();
        registry.advance_tick();
        seen(&mut registry, "A", -60);
        assert_eq!(registry.get(&"A".into()).unwrap().last_seen_tick, 2);
    }

    #[test]
    fn test_grace_period_then_eviction() {
        let mut registry = Registry::new();

        registry.advance_tick(); // 1
        registry
            .on_discovery(&Discovery::new("A", -60).with_calibration(-59))
            .unwrap();
        assert!(registry.sweep().is_empty());

        registry.advance_tick(); // 2
        assert!(registry.sweep().is_empty());
        assert!(registry.contains(&"A".into()));

        registry.advance_tick(); // 3, 3 - 1 == 2 is still inside the window
        assert!(registry.sweep().is_empty());
        assert!(registry.contains(&"A".into()));

        registry.advance_tick(); // 4
        let evicted = registry.sweep();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id().as_str(), "A");
        assert!(registry.snapshot_sorted().is_empty());
    }

    #[test]
    fn test_refreshed_every_tick_is_never_evicted() {
        let mut registry = Registry::new();
        for _ in 0..20 {
            registry.advance_tick();
            seen(&mut registry, "A", -50);
            assert!(registry.sweep().is_empty());
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_sorted_is_stable_under_ties() {
        let mut registry = Registry::new();
        registry.advance_tick();
        seen(&mut registry, "first", -70);
        seen(&mut registry, "strong", -40);
        seen(&mut registry, "second", -70);
        seen(&mut registry, "weak", -90);
        seen(&mut registry, "third", -70);

        let ids: Vec<String> = registry
            .snapshot_sorted()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, ["strong", "first", "second", "third", "weak"]);

        // Refreshing keeps the original insertion slot
        seen(&mut registry, "first", -70);
        let ids: Vec<String> = registry
            .snapshot_sorted()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, ["strong", "first", "second", "third", "weak"]);
    }

    #[test]
    fn test_invalid_samples_are_rejected() {
        let mut registry = Registry::new();
        registry.advance_tick();

        assert_eq!(
            registry.on_discovery(&Discovery::new("A", 0)).unwrap_err(),
            SampleError::ZeroStrength
        );
        assert_eq!(
            registry.on_discovery(&Discovery::new("A", 12)).unwrap_err(),
            SampleError::NonNegativeStrength(12)
        );
        assert_eq!(
            registry.on_discovery(&Discovery::new("", -50)).unwrap_err(),
            SampleError::EmptyId
        );
        assert!(registry.is_empty());

        // An invalid sample does not disturb an existing record
        seen(&mut registry, "A", -60);
        let _ = registry.on_discovery(&Discovery::new("A", 0));
        let record = registry.get(&"A".into()).unwrap();
        assert_eq!(record.signal_strength, -60);
        assert_eq!(record.previous_signal_strength, -60);
    }

    #[test]
    fn test_calibration_fallback_and_refresh() {
        let mut registry = Registry::new();
        registry.advance_tick();
        seen(&mut registry, "A", -60);
        assert_eq!(
            registry.get(&"A".into()).unwrap().calibration_power,
            FALLBACK_CALIBRATION_DBM
        );

        registry
            .on_discovery(&Discovery::new("A", -61).with_calibration(-65))
            .unwrap();
        assert_eq!(registry.get(&"A".into()).unwrap().calibration_power, -65);

        // A sample without calibration keeps the last advertised value
        seen(&mut registry, "A", -62);
        assert_eq!(registry.get(&"A".into()).unwrap().calibration_power, -65);
    }

    #[test]
    fn test_non_negative_calibration_ignored() {
        let mut registry = Registry::new();
        registry.advance_tick();
        registry
            .on_discovery(&Discovery::new("A", -60).with_calibration(4))
            .unwrap();
        let record = registry.get(&"A".into()).unwrap();
        assert_eq!(record.calibration_power, FALLBACK_CALIBRATION_DBM);
        assert!((record.distance() - 0.930).abs() < 0.001);

        registry
            .on_discovery(&Discovery::new("A", -61).with_calibration(-65))
            .unwrap();
        // Later positive or zero values leave the advertised value in place
        registry
            .on_discovery(&Discovery::new("A", -62).with_calibration(8))
            .unwrap();
        registry
            .on_discovery(&Discovery::new("A", -63).with_calibration(0))
            .unwrap();
        assert_eq!(registry.get(&"A".into()).unwrap().calibration_power, -65);
    }

    #[test]
    fn test_placeholder_name_replaced_by_real_name() {
        let mut registry = Registry::new();
        registry.advance_tick();
        seen(&mut registry, "AA:BB:CC:DD:EE:FF", -60);
        let record = registry.get(&"AA:BB:CC:DD:EE:FF".into()).unwrap();
        assert_eq!(record.name, "Unknown (EE:FF)");
        assert!(record.name_is_placeholder);

        registry
            .on_discovery(&Discovery::new("AA:BB:CC:DD:EE:FF", -58).with_name("Keys"))
            .unwrap();
        let record = registry.get(&"AA:BB:CC:DD:EE:FF".into()).unwrap();
        assert_eq!(record.name, "Keys");
        assert!(!record.name_is_placeholder);

        // A nameless sample keeps the learned name
        seen(&mut registry, "AA:BB:CC:DD:EE:FF", -57);
        assert_eq!(registry.get(&"AA:BB:CC:DD:EE:FF".into()).unwrap().name, "Keys");
    }

    #[test]
    fn test_trend() {
        let mut registry = Registry::new();
        registry.advance_tick();
        seen(&mut registry, "A", -70);
        assert_eq!(registry.get(&"A".into()).unwrap().trend(), Trend::Steady);
        assert!(!registry.get(&"A".into()).unwrap().is_improving());

        seen(&mut registry, "A", -60);
        assert_eq!(registry.get(&"A".into()).unwrap().trend(), Trend::Closer);
        assert!(registry.get(&"A".into()).unwrap().is_improving());

        seen(&mut registry, "A", -75);
        assert_eq!(registry.get(&"A".into()).unwrap().trend(), Trend::Farther);
    }
}
