//! Distance-driven pulse loop for the locate view.
//!
//! The pulse period follows a logarithmic curve over the first four meters:
//! small changes close to the device are felt strongly, while everything past
//! four meters pulses at the slowest rate.

use log::debug;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Distances at or beyond this pulse at `max_period`
pub const MAX_FEEDBACK_DISTANCE_M: f64 = 4.0;

/// Receives one call per feedback-timer firing
pub trait Actuator: Send + Sync + 'static {
    fn pulse(&self);
}

/// Rings the terminal bell on every pulse
#[derive(Debug, Default)]
pub struct TerminalBell;

impl Actuator for TerminalBell {
    fn pulse(&self) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(b"\x07");
        let _ = stdout.flush();
    }
}

/// Position of `distance_m` on the log curve: 0.0 at the device, 1.0 at 4 m and beyond
///
/// Negative distances (including the no-reading sentinel) map to 0.0.
pub fn indicator_scale(distance_m: f64) -> f64 {
    let clamped = if distance_m.is_nan() {
        MAX_FEEDBACK_DISTANCE_M
    } else {
        distance_m.clamp(0.0, MAX_FEEDBACK_DISTANCE_M)
    };
    let normalized = clamped / MAX_FEEDBACK_DISTANCE_M;
    (normalized * 9.0 + 1.0).log10()
}

/// Maps distance to pulse period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseCurve {
    /// Fastest pulse, used at the device
    pub min_period: Duration,
    /// Slowest pulse, used at 4 m and beyond
    pub max_period: Duration,
}

impl Default for PulseCurve {
    fn default() -> Self {
        PulseCurve {
            min_period: Duration::from_millis(50),
            max_period: Duration::from_millis(1500),
        }
    }
}

impl PulseCurve {
    pub fn new(min_period: Duration, max_period: Duration) -> Self {
        PulseCurve {
            min_period,
            max_period,
        }
    }

    pub fn period_for(&self, distance_m: f64) -> Duration {
        let min = self.min_period.as_nanos() as f64;
        let max = self.max_period.as_nanos() as f64;
        let period = min + indicator_scale(distance_m) * (max - min);
        Duration::from_nanos(period.max(min).round() as u64)
    }
}

struct Armed {
    period: Duration,
    task: JoinHandle<()>,
}

/// Owns the repeating pulse timer
///
/// Must be used from inside a tokio runtime.
pub struct FeedbackScheduler {
    curve: PulseCurve,
    actuator: Arc<dyn Actuator>,
    armed: Option<Armed>,
}

impl FeedbackScheduler {
    pub fn new(curve: PulseCurve, actuator: Arc<dyn Actuator>) -> Self {
        FeedbackScheduler {
            curve,
            actuator,
            armed: None,
        }
    }

    /// Restart the pulse timer for `distance_m`
    ///
    /// A timer already running at the resulting period is left untouched.
    pub fn rearm(&mut self, distance_m: f64) -> Duration {
        let period = self.curve.period_for(distance_m);

        if let Some(armed) = &self.armed {
            if armed.period == period && !armed.task.is_finished() {
                return period;
            }
        }
        self.stop();

        debug!(
            "Feedback re-armed: {:.3} m -> {} ms",
            distance_m,
            period.as_millis()
        );

        let actuator = Arc::clone(&self.actuator);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                actuator.pulse();
            }
        });
        self.armed = Some(Armed { period, task });
        period
    }

    /// Cancel the timer; no pulse fires after this returns
    pub fn stop(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
        }
    }

    /// Period of the running timer, if any
    pub fn period(&self) -> Option<Duration> {
        self.armed.as_ref().map(|armed| armed.period)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn curve(&self) -> PulseCurve {
        self.curve
    }
}

impl Drop for FeedbackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
