//! Tracking of the one device the user is walking toward.
//!
//! The focus keeps its own copy of the device record, fed directly from
//! discoveries, so registry eviction never takes it away mid-search. The
//! registry is only consulted when focus ends, to decide whether the device
//! dropped out of range.

use crate::radio::{DeviceId, Discovery};
use crate::registry::{DeviceRecord, Registry};
use log::{debug, info};
use serde::Serialize;

#[derive(Debug, Clone)]
struct FocusState {
    id: DeviceId,
    record: Option<DeviceRecord>,
}

/// Reported once when focus ends
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusOutcome {
    pub id: DeviceId,
    /// Last known display name, if the device was ever heard
    pub name: Option<String>,
    /// The device is gone from the registry or missed the last completed tick
    pub lost: bool,
}

impl FocusOutcome {
    /// Alert text shown when the device was lost
    pub fn alert_message(&self) -> String {
        let name = self
            .name
            .as_deref()
            .unwrap_or("The device you were viewing");
        format!("{} is no longer in range.", name)
    }
}

#[derive(Debug, Default)]
pub struct FocusTracker {
    state: Option<FocusState>,
}

impl FocusTracker {
    pub fn new() -> Self {
        FocusTracker::default()
    }

    /// Focus on `id`, seeding the record from the registry when it is known
    ///
    /// Replaces any previous focus without reporting on it.
    pub fn set_focus(&mut self, id: DeviceId, registry: &Registry) -> Option<&DeviceRecord> {
        let record = registry.get(&id).cloned();
        info!(
            "Focus set on {}{}",
            id,
            if record.is_some() { "" } else { " (not yet seen)" }
        );
        self.state = Some(FocusState { id, record });
        self.record()
    }

    /// End focus and decide whether the device was lost
    pub fn clear_focus(&mut self, registry: &Registry) -> Option<FocusOutcome> {
        let state = self.state.take()?;

        let refreshed_last_tick = state
            .record
            .as_ref()
            .is_some_and(|record| record.last_seen_tick == registry.current_tick());
        let lost = !registry.contains(&state.id) || !refreshed_last_tick;

        info!("Focus on {} cleared (lost: {})", state.id, lost);
        Some(FocusOutcome {
            name: state.record.map(|record| record.name),
            id: state.id,
            lost,
        })
    }

    /// Feed a discovery; returns the updated record if it belongs to the focus
    ///
    /// Callers pass only samples the registry accepted.
    pub fn observe(&mut self, discovery: &Discovery, tick: u64) -> Option<&DeviceRecord> {
        let state = self.state.as_mut().filter(|state| state.id == discovery.id)?;

        match state.record.as_mut() {
            Some(record) => record.refresh(discovery, tick),
            None => {
                debug!("Focused device {} heard for the first time", discovery.id);
                state.record = Some(DeviceRecord::new(discovery, tick));
            }
        }
        state.record.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn focused_id(&self) -> Option<&DeviceId> {
        self.state.as_ref().map(|state| &state.id)
    }

    pub fn record(&self) -> Option<&DeviceRecord> {
        self.state.as_ref().and_then(|state| state.record.as_ref())
    }

    pub fn is_improving(&self) -> bool {
        self.record().is_some_and(DeviceRecord::is_improving)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_to(registry: &mut Registry, tick: u64) {
        while registry.current_tick() < tick {
            registry.advance_tick();
            registry.sweep();
        }
    }

    fn discover(registry: &mut Registry, focus: &mut FocusTracker, d: Discovery) {
        registry.on_discovery(&d).unwrap();
        focus.observe(&d, registry.current_tick());
    }

    #[test]
    fn test_refreshed_on_last_tick_is_not_lost() {
        let mut registry = Registry::new();
        let mut focus = FocusTracker::new();

        tick_to(&mut registry, 4);
        discover(&mut registry, &mut focus, Discovery::new("B", -70).with_name("Tag"));
        focus.set_focus("B".into(), &registry);

        tick_to(&mut registry, 5);
        discover(&mut registry, &mut focus, Discovery::new("B", -66));

        let outcome = focus.clear_focus(&registry).unwrap();
        assert!(!outcome.lost);
        assert_eq!(outcome.name.as_deref(), Some("Tag"));
        assert!(!focus.is_active());
    }

    #[test]
    fn test_missed_last_tick_is_lost() {
        let mut registry = Registry::new();
        let mut focus = FocusTracker::new();

        tick_to(&mut registry, 5);
        discover(&mut registry, &mut focus, Discovery::new("B", -70));
        focus.set_focus("B".into(), &registry);

        // Still in the registry (grace period) but not refreshed on tick 6
        tick_to(&mut registry, 6);
        assert!(registry.contains(&"B".into()));

        let outcome = focus.clear_focus(&registry).unwrap();
        assert!(outcome.lost);
        assert_eq!(outcome.alert_message(), "Unknown (B) is no longer in range.");
    }

    #[test]
    fn test_focus_survives_registry_eviction() {
        let mut registry = Registry::new();
        let mut focus = FocusTracker::new();

        tick_to(&mut registry, 1);
        discover(&mut registry, &mut focus, Discovery::new("B", -70));
        focus.set_focus("B".into(), &registry);

        tick_to(&mut registry, 6);
        assert!(!registry.contains(&"B".into()));
        assert_eq!(focus.record().unwrap().signal_strength, -70);

        let outcome = focus.clear_focus(&registry).unwrap();
        assert!(outcome.lost);
    }

    #[test]
    fn test_focus_on_unseen_device() {
        let mut registry = Registry::new();
        let mut focus = FocusTracker::new();
        tick_to(&mut registry, 1);

        assert!(focus.set_focus("C".into(), &registry).is_none());
        assert!(focus.record().is_none());

        discover(&mut registry, &mut focus, Discovery::new("C", -80));
        let record = focus.record().unwrap();
        assert_eq!(record.previous_signal_strength, -80);
        assert!(!focus.is_improving());

        discover(&mut registry, &mut focus, Discovery::new("C", -75));
        assert!(focus.is_improving());

        assert!(!focus.clear_focus(&registry).unwrap().lost);
    }

    #[test]
    fn test_observe_ignores_other_devices() {
        let mut registry = Registry::new();
        let mut focus = FocusTracker::new();
        tick_to(&mut registry, 1);
        focus.set_focus("B".into(), &registry);

        assert!(focus.observe(&Discovery::new("A", -50), 1).is_none());
        assert!(focus.record().is_none());
    }

    #[test]
    fn test_clear_without_focus() {
        let registry = Registry::new();
        let mut focus = FocusTracker::new();
        assert!(focus.clear_focus(&registry).is_none());
    }
}
