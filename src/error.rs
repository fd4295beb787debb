use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a discovery sample was discarded at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("signal strength of 0 is not a reading")]
    ZeroStrength,
    #[error("non-negative signal strength {0} dBm is implausible")]
    NonNegativeStrength(i32),
    #[error("discovery carried an empty device identifier")]
    EmptyId,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to read scenario {path:?}: {source}")]
    ScenarioRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse scenario {path:?}: {source}")]
    ScenarioParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("transport used before open()")]
    NotOpen,
}

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("scan scheduler is no longer running")]
    Stopped,
}
