use crate::engine::{DeviceView, EngineView};
use crate::feedback::PulseCurve;
use crate::focus::FocusOutcome;
use crate::radio::DeviceId;
use crate::tui::TuiEvent;
use chrono::{DateTime, Local};
use tokio::sync::mpsc;

/// Frames the locate indicator stays highlighted after a pulse
const PULSE_FLASH_FRAMES: u8 = 3;

/// Which screen is showing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    DeviceList,
    Locate(DeviceId),
}

/// Work the event loop performs against the scanner on the app's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Locate(DeviceId),
    StopLocating,
}

/// Main application state
pub struct App {
    /// Whether the app is running
    pub running: bool,

    pub screen: Screen,

    /// Latest snapshot published by the scanner
    pub view: EngineView,

    /// Currently selected row in the device list
    pub selected_device: usize,

    /// Help overlay visible
    pub show_help: bool,

    /// Modal alert (device lost), dismissed with Enter/Esc
    pub alert: Option<String>,

    /// Same curve the feedback scheduler uses, for showing the pulse period
    pub pulse_curve: PulseCurve,

    /// Countdown of highlighted frames after the last pulse
    pub pulse_flash: u8,
    pub pulses: u64,

    pub last_error: Option<String>,

    pub started_at: DateTime<Local>,

    /// Event receiver
    pub event_rx: mpsc::Receiver<TuiEvent>,
}

impl App {
    pub fn new(event_rx: mpsc::Receiver<TuiEvent>, pulse_curve: PulseCurve) -> Self {
        App {
            running: true,
            screen: Screen::DeviceList,
            view: EngineView::default(),
            selected_device: 0,
            show_help: false,
            alert: None,
            pulse_curve,
            pulse_flash: 0,
            pulses: 0,
            last_error: None,
            started_at: Local::now(),
            event_rx,
        }
    }

    pub fn tick(&mut self) {
        self.pulse_flash = self.pulse_flash.saturating_sub(1);
    }

    /// Take a new snapshot, keeping the selection on the same device when it moves
    pub fn update_view(&mut self, view: EngineView) {
        let selected_id = self.selected_id().cloned();
        self.view = view;

        if let Some(id) = selected_id {
            if let Some(idx) = self.view.devices.iter().position(|d| d.id == id) {
                self.selected_device = idx;
                return;
            }
        }
        self.selected_device = self
            .selected_device
            .min(self.view.devices.len().saturating_sub(1));
    }

    pub fn handle_event(&mut self, event: TuiEvent) {
        match event {
            TuiEvent::Pulse => {
                self.pulses += 1;
                self.pulse_flash = PULSE_FLASH_FRAMES;
            }
            TuiEvent::FocusStarted(id) => {
                self.screen = Screen::Locate(id);
                self.pulse_flash = 0;
            }
            TuiEvent::FocusEnded(outcome) => self.on_focus_ended(outcome),
            TuiEvent::Error(msg) => {
                self.last_error = Some(msg);
            }
        }
    }

    fn on_focus_ended(&mut self, outcome: Option<FocusOutcome>) {
        self.screen = Screen::DeviceList;
        self.pulse_flash = 0;
        if let Some(outcome) = outcome.filter(|o| o.lost) {
            self.alert = Some(outcome.alert_message());
        }
    }

    pub fn selected_id(&self) -> Option<&DeviceId> {
        self.view
            .devices
            .get(self.selected_device)
            .map(|device| &device.id)
    }

    pub fn selected(&self) -> Option<&DeviceView> {
        self.view.devices.get(self.selected_device)
    }

    pub fn scroll_up(&mut self) {
        if self.selected_device > 0 {
            self.selected_device -= 1;
        }
    }

    pub fn scroll_down(&mut self) {
        if self.selected_device < self.view.devices.len().saturating_sub(1) {
            self.selected_device += 1;
        }
    }

    /// Enter on the list starts locating the selected device
    pub fn select_device(&self) -> Option<Action> {
        match self.screen {
            Screen::DeviceList => self.selected_id().cloned().map(Action::Locate),
            Screen::Locate(_) => None,
        }
    }

    /// Esc: close the topmost overlay, or leave the locate view
    pub fn back(&mut self) -> Option<Action> {
        if self.alert.take().is_some() {
            return None;
        }
        if self.show_help {
            self.show_help = false;
            return None;
        }
        match self.screen {
            Screen::Locate(_) => Some(Action::StopLocating),
            Screen::DeviceList => None,
        }
    }

    pub fn is_locating(&self) -> bool {
        matches!(self.screen, Screen::Locate(_))
    }

    pub fn uptime_secs(&self) -> u64 {
        (Local::now() - self.started_at).num_seconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Trend;

    fn device(id: &str, rssi: i32) -> DeviceView {
        DeviceView {
            id: DeviceId::new(id),
            name: id.to_string(),
            signal_strength: rssi,
            previous_signal_strength: rssi,
            calibration_power: -59,
            distance_m: crate::distance::estimate(Some(rssi), Some(-59)),
            trend: Trend::Steady,
            last_seen_tick: 1,
        }
    }

    fn view(devices: Vec<DeviceView>) -> EngineView {
        EngineView {
            devices,
            ..EngineView::default()
        }
    }

    fn app() -> App {
        let (_tx, rx) = mpsc::channel(1);
        App::new(rx, PulseCurve::default())
    }

    #[test]
    fn test_selection_follows_device_when_list_reorders() {
        let mut app = app();
        app.update_view(view(vec![device("A", -50), device("B", -60), device("C", -70)]));
        app.scroll_down();
        assert_eq!(app.selected_id().unwrap().as_str(), "B");

        app.update_view(view(vec![device("B", -40), device("A", -50), device("C", -70)]));
        assert_eq!(app.selected_id().unwrap().as_str(), "B");
        assert_eq!(app.selected_device, 0);

        // Selected device evicted: selection is clamped
        app.scroll_down();
        app.scroll_down();
        app.update_view(view(vec![device("A", -50)]));
        assert_eq!(app.selected_device, 0);
    }

    #[test]
    fn test_locate_and_lost_alert() {
        let mut app = app();
        app.update_view(view(vec![device("A", -50)]));

        assert_eq!(app.select_device(), Some(Action::Locate("A".into())));
        app.handle_event(TuiEvent::FocusStarted("A".into()));
        assert!(app.is_locating());
        assert_eq!(app.back(), Some(Action::StopLocating));

        app.handle_event(TuiEvent::FocusEnded(Some(FocusOutcome {
            id: "A".into(),
            name: Some("Keys".to_string()),
            lost: true,
        })));
        assert!(!app.is_locating());
        assert_eq!(app.alert.as_deref(), Some("Keys is no longer in range."));

        // First Esc only dismisses the alert
        assert_eq!(app.back(), None);
        assert!(app.alert.is_none());
    }

    #[test]
    fn test_no_alert_when_not_lost() {
        let mut app = app();
        app.handle_event(TuiEvent::FocusStarted("A".into()));
        app.handle_event(TuiEvent::FocusEnded(Some(FocusOutcome {
            id: "A".into(),
            name: None,
            lost: false,
        })));
        assert!(app.alert.is_none());
    }

    #[test]
    fn test_pulse_flash_decays() {
        let mut app = app();
        app.handle_event(TuiEvent::Pulse);
        assert_eq!(app.pulses, 1);
        for _ in 0..PULSE_FLASH_FRAMES {
            assert!(app.pulse_flash > 0);
            app.tick();
        }
        assert_eq!(app.pulse_flash, 0);
    }
}
