//! Boundary between the proximity engine and whatever performs discovery.
//!
//! A transport pushes [`RadioEvent`]s into the channel handed to
//! [`RadioTransport::open`] and obeys `start_scan`/`stop_scan` requests from
//! the scan scheduler. Events may arrive at any time, in any order.

pub mod bluez;
pub mod replay;

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

pub use bluez::BluezTransport;
pub use replay::ReplayTransport;

/// Opaque identifier of a radio source, stable for one session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last few characters, used to tell placeholder names apart
    pub fn short(&self) -> &str {
        let start = self
            .0
            .char_indices()
            .rev()
            .nth(4)
            .map(|(i, _)| i)
            .unwrap_or(0);
        &self.0[start..]
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        DeviceId::new(id)
    }
}

/// Radio capability as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    #[default]
    Unknown,
    PoweredOn,
    PoweredOff,
    Unauthorized,
    Unsupported,
}

impl RadioState {
    pub fn is_powered_on(self) -> bool {
        self == RadioState::PoweredOn
    }

    /// Banner text for states that suspend scanning
    pub fn capability_error(self) -> Option<&'static str> {
        match self {
            RadioState::PoweredOn => None,
            RadioState::Unknown => Some("Waiting for the Bluetooth controller"),
            RadioState::PoweredOff => Some("Bluetooth is turned off"),
            RadioState::Unauthorized => Some("Not authorized to use Bluetooth"),
            RadioState::Unsupported => Some("Bluetooth LE is not available on this system"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RadioState::Unknown => "UNKNOWN",
            RadioState::PoweredOn => "ON",
            RadioState::PoweredOff => "OFF",
            RadioState::Unauthorized => "UNAUTHORIZED",
            RadioState::Unsupported => "UNSUPPORTED",
        }
    }
}

/// One advertisement as delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub id: DeviceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "rssi")]
    pub signal_strength: i32,
    #[serde(default, alias = "tx_power")]
    pub calibration_power: Option<i32>,
}

impl Discovery {
    pub fn new(id: impl Into<String>, signal_strength: i32) -> Self {
        Discovery {
            id: DeviceId::new(id),
            name: None,
            signal_strength,
            calibration_power: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_calibration(mut self, calibration_power: i32) -> Self {
        self.calibration_power = Some(calibration_power);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    Capability(RadioState),
    Discovered(Discovery),
}

/// A source of discovery events
///
/// `open` is called once, from inside the tokio runtime, before any scan
/// request. `start_scan` is issued at most once per tick and only while the
/// last reported state is [`RadioState::PoweredOn`].
pub trait RadioTransport: Send + 'static {
    fn open(&mut self, events: mpsc::Sender<RadioEvent>) -> Result<(), TransportError>;

    fn start_scan(&mut self) -> Result<(), TransportError>;

    fn stop_scan(&mut self);

    fn close(&mut self) {
        self.stop_scan();
    }
}

impl<T: RadioTransport + ?Sized> RadioTransport for Box<T> {
    fn open(&mut self, events: mpsc::Sender<RadioEvent>) -> Result<(), TransportError> {
        (**self).open(events)
    }

    fn start_scan(&mut self) -> Result<(), TransportError> {
        (**self).start_scan()
    }

    fn stop_scan(&mut self) {
        (**self).stop_scan()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(DeviceId::new("AA:BB:CC:DD:EE:FF").short(), "EE:FF");
        assert_eq!(DeviceId::new("abc").short(), "abc");
    }

    #[test]
    fn test_discovery_json_aliases() {
        let d: Discovery =
            serde_json::from_str(r#"{"id":"A","rssi":-60,"tx_power":-59}"#).unwrap();
        assert_eq!(d, Discovery::new("A", -60).with_calibration(-59));
    }

    #[test]
    fn test_capability_error() {
        assert!(RadioState::PoweredOn.capability_error().is_none());
        assert!(RadioState::PoweredOff.capability_error().is_some());
        assert!(RadioState::Unsupported.capability_error().is_some());
    }
}
