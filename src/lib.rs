pub mod config;
pub mod distance;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod focus;
pub mod radio;
pub mod registry;
pub mod scanner;
pub mod tui;

pub use config::Config;
pub use distance::estimate;
pub use engine::{EngineView, ProximityEngine};
pub use radio::{DeviceId, Discovery, RadioEvent, RadioState, RadioTransport};
pub use scanner::{ScanScheduler, ScannerHandle, TickEndClear};
