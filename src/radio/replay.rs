//! Scenario replay transport.
//!
//! Plays back a recorded or hand-written session from JSON on its own clock.
//! Like a real radio, advertisements in a frame are only delivered while a
//! scan is active; capability changes are always delivered.

use super::{Discovery, RadioEvent, RadioState, RadioTransport};
use crate::error::TransportError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Capability change delivered at the start of this frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<RadioState>,
    #[serde(default)]
    pub discoveries: Vec<Discovery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_initial_state")]
    pub initial_state: RadioState,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Start over after the last frame
    #[serde(default)]
    pub repeat: bool,
    pub frames: Vec<Frame>,
}

fn default_initial_state() -> RadioState {
    RadioState::PoweredOn
}

fn default_frame_interval_ms() -> u64 {
    2000
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| TransportError::ScenarioRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| TransportError::ScenarioParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A short walk toward a tag while two other devices come and go
    pub fn sample() -> Self {
        let tag = |rssi: i32| Discovery::new("C8:3F:26:0A:91:7E", rssi).with_name("Keys");
        let phone = |rssi: i32| {
            Discovery::new("5A:10:EE:42:03:B1", rssi)
                .with_name("Pixel 8")
                .with_calibration(-62)
        };
        let beacon = |rssi: i32| Discovery::new("F0:0D:CA:FE:00:01", rssi);

        let frames = vec![
            Frame {
                capability: None,
                discoveries: vec![tag(-84), phone(-55), beacon(-90)],
            },
            Frame {
                capability: None,
                discoveries: vec![tag(-79), phone(-57)],
            },
            Frame {
                capability: None,
                discoveries: vec![tag(-73), phone(-56)],
            },
            Frame {
                capability: Some(RadioState::PoweredOff),
                discoveries: vec![],
            },
            Frame {
                capability: Some(RadioState::PoweredOn),
                discoveries: vec![tag(-66)],
            },
            Frame {
                capability: None,
                discoveries: vec![tag(-60), phone(-58), Discovery::new("5A:10:EE:42:03:B1", 0)],
            },
            Frame {
                capability: None,
                discoveries: vec![tag(-52)],
            },
            Frame {
                capability: None,
                discoveries: vec![tag(-41)],
            },
        ];

        Scenario {
            initial_state: RadioState::PoweredOn,
            frame_interval_ms: default_frame_interval_ms(),
            repeat: true,
            frames,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

pub struct ReplayTransport {
    scenario: Arc<Scenario>,
    scanning: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl ReplayTransport {
    pub fn new(scenario: Scenario) -> Self {
        ReplayTransport {
            scenario: Arc::new(scenario),
            scanning: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TransportError> {
        let scenario = Scenario::load(path.as_ref())?;
        info!(
            "Loaded scenario {:?}: {} frames every {} ms",
            path.as_ref(),
            scenario.frames.len(),
            scenario.frame_interval_ms
        );
        Ok(ReplayTransport::new(scenario))
    }
}

impl RadioTransport for ReplayTransport {
    fn open(&mut self, events: mpsc::Sender<RadioEvent>) -> Result<(), TransportError> {
        let scenario = Arc::clone(&self.scenario);
        let scanning = Arc::clone(&self.scanning);

        self.task = Some(tokio::spawn(async move {
            if events
                .send(RadioEvent::Capability(scenario.initial_state))
                .await
                .is_err()
            {
                return;
            }

            let period = Duration::from_millis(scenario.frame_interval_ms.max(1));
            // Frames land mid-tick when the scan interval matches the frame interval
            let mut ticker = interval_at(Instant::now() + period / 2, period);

            loop {
                for (index, frame) in scenario.frames.iter().enumerate() {
                    ticker.tick().await;

                    if let Some(state) = frame.capability {
                        if events.send(RadioEvent::Capability(state)).await.is_err() {
                            return;
                        }
                    }
                    if !scanning.load(Ordering::SeqCst) {
                        debug!("Replay frame {} dropped, no scan active", index);
                        continue;
                    }
                    for discovery in &frame.discoveries {
                        if events
                            .send(RadioEvent::Discovered(discovery.clone()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                if !scenario.repeat {
                    info!("Scenario finished");
                    return;
                }
            }
        }));
        Ok(())
    }

    fn start_scan(&mut self) -> Result<(), TransportError> {
        if self.task.is_none() {
            return Err(TransportError::NotOpen);
        }
        self.scanning.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.scanning.store(false, Ordering::SeqCst);
    }

    fn close(&mut self) {
        self.stop_scan();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ReplayTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_defaults() {
        let json = r#"{ "frames": [ { "discoveries": [ { "id": "A", "rssi": -60 } ] }, {} ] }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert_eq!(scenario.initial_state, RadioState::PoweredOn);
        assert_eq!(scenario.frame_interval_ms, 2000);
        assert!(!scenario.repeat);
        assert_eq!(scenario.frames.len(), 2);
        assert!(scenario.frames[1].discoveries.is_empty());
    }

    #[test]
    fn test_sample_round_trips_through_json() {
        let sample = Scenario::sample();
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(serde_json::from_str::<Scenario>(&json).unwrap(), sample);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discoveries_gated_on_scan() {
        let scenario = Scenario {
            initial_state: RadioState::PoweredOn,
            frame_interval_ms: 1000,
            repeat: false,
            frames: vec![
                Frame {
                    capability: None,
                    discoveries: vec![Discovery::new("A", -60)],
                },
                Frame {
                    capability: Some(RadioState::PoweredOff),
                    discoveries: vec![Discovery::new("B", -60)],
                },
            ],
        };
        let mut transport = ReplayTransport::new(scenario);
        assert!(matches!(transport.start_scan(), Err(TransportError::NotOpen)));

        let (tx, mut rx) = mpsc::channel(16);
        transport.open(tx).unwrap();
        transport.start_scan().unwrap();

        assert_eq!(
            rx.recv().await,
            Some(RadioEvent::Capability(RadioState::PoweredOn))
        );
        assert_eq!(
            rx.recv().await,
            Some(RadioEvent::Discovered(Discovery::new("A", -60)))
        );

        transport.stop_scan();
        assert_eq!(
            rx.recv().await,
            Some(RadioEvent::Capability(RadioState::PoweredOff))
        );
        // Frame 2's discovery is dropped and the scenario ends
        assert_eq!(rx.recv().await, None);
    }
}
