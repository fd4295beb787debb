use crate::feedback::PulseCurve;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub scan: ScanConfig,
    #[serde(default)]
    pub distance: DistanceConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Length of one scan tick
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceConfig {
    /// Use the tx power a device advertises; false always uses -59 dBm
    pub use_advertised_calibration: bool,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        DistanceConfig {
            use_advertised_calibration: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Pulse period right at the device
    pub min_period_ms: u64,
    /// Pulse period at 4 meters and beyond
    pub max_period_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        FeedbackConfig {
            min_period_ms: 50,
            max_period_ms: 1500,
        }
    }
}

impl FeedbackConfig {
    pub fn curve(&self) -> PulseCurve {
        PulseCurve::new(
            Duration::from_millis(self.min_period_ms),
            Duration::from_millis(self.max_period_ms),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// System bluetoothctl
    Bluez,
    /// JSON scenario file
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// How long each `bluetoothctl scan` runs
    pub scan_window_secs: u64,
    /// How often controller power state is polled
    pub capability_poll_ms: u64,
    pub replay_path: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Config {
            scan: ScanConfig { interval_ms: 2000 },
            distance: DistanceConfig::default(),
            feedback: FeedbackConfig::default(),
            transport: TransportConfig {
                kind: TransportKind::Bluez,
                scan_window_secs: 1,
                capability_poll_ms: 5000,
                replay_path: "scenario.json".to_string(),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.scan.interval_ms > 0, "scan.interval_ms must be positive");
        ensure!(
            self.feedback.min_period_ms > 0,
            "feedback.min_period_ms must be positive"
        );
        ensure!(
            self.feedback.min_period_ms < self.feedback.max_period_ms,
            "feedback.min_period_ms ({}) must be below feedback.max_period_ms ({})",
            self.feedback.min_period_ms,
            self.feedback.max_period_ms
        );
        ensure!(
            self.transport.scan_window_secs > 0,
            "transport.scan_window_secs must be positive"
        );
        ensure!(
            self.transport.capability_poll_ms > 0,
            "transport.capability_poll_ms must be positive"
        );
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan.interval_ms)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_optional_sections_default() {
        let json = r#"{
            "scan": { "interval_ms": 1000 },
            "transport": {
                "kind": "replay",
                "scan_window_secs": 1,
                "capability_poll_ms": 5000,
                "replay_path": "demo.json"
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.transport.kind, TransportKind::Replay);
        assert!(config.distance.use_advertised_calibration);
        assert_eq!(config.feedback.max_period_ms, 1500);
    }

    #[test]
    fn test_rejects_inverted_feedback_periods() {
        let mut config = Config::default();
        config.feedback.min_period_ms = 2000;
        assert!(config.validate().is_err());
    }
}
