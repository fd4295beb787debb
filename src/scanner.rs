//! Scan scheduler: the single task that owns a scan session.
//!
//! Three inputs are multiplexed in one `select!` loop, so every engine
//! mutation is serialized without locks:
//!
//! - the scan ticker (fixed cadence),
//! - radio events from the transport (capability changes, discoveries),
//! - commands from the presentation layer (focus on/off, stop).
//!
//! After each step the loop publishes a fresh [`EngineView`] on a watch
//! channel. Readers never touch the engine directly.

use crate::config::Config;
use crate::distance;
use crate::engine::{EngineView, FocusChange, ProximityEngine};
use crate::error::{ScannerError, TransportError};
use crate::feedback::{Actuator, FeedbackScheduler};
use crate::focus::FocusOutcome;
use crate::radio::{DeviceId, RadioEvent, RadioTransport};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

const EVENT_QUEUE_DEPTH: usize = 1024;
const COMMAND_QUEUE_DEPTH: usize = 16;

/// Focus cleared as its tick closed
#[derive(Debug, Clone)]
pub struct TickEndClear {
    /// View of the closing tick, taken before focus was dropped
    pub view: EngineView,
    pub outcome: Option<FocusOutcome>,
}

enum Command {
    SetFocus(DeviceId, oneshot::Sender<Option<f64>>),
    ClearFocus(oneshot::Sender<Option<FocusOutcome>>),
    ClearFocusAtTickEnd(oneshot::Sender<TickEndClear>),
    Stop,
}

pub struct ScanScheduler<T: RadioTransport> {
    engine: ProximityEngine,
    transport: T,
    feedback: FeedbackScheduler,
    interval: Duration,
    scanning: bool,
    pending_clear: Option<oneshot::Sender<TickEndClear>>,
}

impl<T: RadioTransport> ScanScheduler<T> {
    pub fn new(config: &Config, transport: T, actuator: Arc<dyn Actuator>) -> Self {
        ScanScheduler {
            engine: ProximityEngine::new(config.distance.use_advertised_calibration),
            transport,
            feedback: FeedbackScheduler::new(config.feedback.curve(), actuator),
            interval: config.scan_interval(),
            scanning: false,
            pending_clear: None,
        }
    }

    /// Open the transport and start the scheduler task
    ///
    /// Must be called from inside a tokio runtime.
    pub fn spawn(mut self) -> Result<ScannerHandle, TransportError> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (view_tx, view_rx) = watch::channel(self.engine.view());

        self.transport.open(event_tx)?;
        info!(
            "Scan scheduler started, tick every {} ms",
            self.interval.as_millis()
        );

        let task = tokio::spawn(self.run(event_rx, command_rx, view_tx));

        Ok(ScannerHandle {
            commands: command_tx,
            view: view_rx,
            task,
        })
    }

    async fn run(
        mut self,
        mut events: mpsc::Receiver<RadioEvent>,
        mut commands: mpsc::Receiver<Command>,
        view_tx: watch::Sender<EngineView>,
    ) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(&mut events),
                Some(event) = events.recv() => self.on_radio_event(event),
                command = commands.recv() => match command {
                    Some(Command::Stop) | None => break,
                    Some(command) => self.on_command(command),
                },
            }
            view_tx.send_replace(self.engine.view());
        }

        self.transport.close();
        self.clear_pending_focus();
        self.feedback.stop();
        view_tx.send_replace(self.engine.view());
        info!(
            "Scan scheduler stopped at tick {}",
            self.engine.current_tick()
        );
    }

    fn on_tick(&mut self, events: &mut mpsc::Receiver<RadioEvent>) {
        if self.engine.current_tick() > 0 {
            self.stop_scan();
            // Everything delivered during the closing tick is ingested before its sweep
            while let Ok(event) = events.try_recv() {
                self.on_radio_event(event);
            }
            self.clear_pending_focus();
            self.engine.end_tick();
        }

        let tick = self.engine.begin_tick();
        if self.engine.radio_state().is_powered_on() {
            self.start_scan();
        }
        debug!(
            "Tick {}: {} devices in range, radio {}",
            tick,
            self.engine.registry().len(),
            self.engine.radio_state().label()
        );
    }

    /// Answer a deferred clear against the tick that is closing
    fn clear_pending_focus(&mut self) {
        let Some(reply) = self.pending_clear.take() else {
            return;
        };
        self.feedback.stop();
        let view = self.engine.view();
        let outcome = self.engine.clear_focus();
        let _ = reply.send(TickEndClear { view, outcome });
    }

    fn on_radio_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Capability(state) => {
                if !self.engine.set_radio_state(state) {
                    return;
                }
                if !state.is_powered_on() {
                    self.stop_scan();
                } else if self.engine.current_tick() > 0 && !self.scanning {
                    // Powered on mid-tick: scan for the rest of it
                    self.start_scan();
                }
            }
            RadioEvent::Discovered(discovery) => {
                if let FocusChange::Moved(distance_m) = self.engine.ingest(discovery) {
                    self.feedback.rearm(distance_m);
                }
            }
        }
    }

    fn start_scan(&mut self) {
        match self.transport.start_scan() {
            Ok(()) => self.scanning = true,
            Err(e) => warn!(
                "Scan request failed at tick {}: {}",
                self.engine.current_tick(),
                e
            ),
        }
    }

    fn stop_scan(&mut self) {
        if self.scanning {
            self.transport.stop_scan();
            self.scanning = false;
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::SetFocus(id, reply) => {
                let distance_m = self.engine.set_focus(id);
                match distance_m.filter(|d| distance::is_reading(*d)) {
                    Some(d) => {
                        self.feedback.rearm(d);
                    }
                    None => self.feedback.stop(),
                }
                let _ = reply.send(distance_m);
            }
            Command::ClearFocus(reply) => {
                self.feedback.stop();
                let _ = reply.send(self.engine.clear_focus());
            }
            Command::ClearFocusAtTickEnd(reply) => {
                if self.pending_clear.replace(reply).is_some() {
                    debug!("Deferred focus clear replaced by a newer request");
                }
            }
            Command::Stop => {}
        }
    }
}

/// Client side of a running scan scheduler
pub struct ScannerHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<EngineView>,
    task: JoinHandle<()>,
}

impl ScannerHandle {
    /// Receiver of the published views; stays readable after the scheduler stops
    pub fn view(&self) -> watch::Receiver<EngineView> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> EngineView {
        self.view.borrow().clone()
    }

    /// Focus on `id`; resolves to the current distance if the device is known
    pub async fn set_focus(&self, id: DeviceId) -> Result<Option<f64>, ScannerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::SetFocus(id, reply_tx))
            .await
            .map_err(|_| ScannerError::Stopped)?;
        reply_rx.await.map_err(|_| ScannerError::Stopped)
    }

    /// End focus; resolves to the loss verdict, or `None` when nothing was focused
    pub async fn clear_focus(&self) -> Result<Option<FocusOutcome>, ScannerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::ClearFocus(reply_tx))
            .await
            .map_err(|_| ScannerError::Stopped)?;
        reply_rx.await.map_err(|_| ScannerError::Stopped)
    }

    /// End focus when the current tick closes
    ///
    /// The verdict is taken after that tick's discoveries are ingested and
    /// before the next tick opens, so a device heard during the tick is not
    /// reported lost. Resolves immediately with the final state if the
    /// scheduler stops first.
    pub async fn clear_focus_at_tick_end(&self) -> Result<TickEndClear, ScannerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::ClearFocusAtTickEnd(reply_tx))
            .await
            .map_err(|_| ScannerError::Stopped)?;
        reply_rx.await.map_err(|_| ScannerError::Stopped)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop scanning and wait for the scheduler to wind down; returns the final view
    pub async fn stop(self) -> EngineView {
        let _ = self.commands.send(Command::Stop).await;
        if let Err(e) = self.task.await {
            error!("Scan scheduler task failed: {}", e);
        }
        let view = self.view.borrow().clone();
        view
    }
}
