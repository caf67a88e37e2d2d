//! Error types.

use std::io;

use crate::CellIndex;

pub type Result<T> = core::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("collision: cell {0} is already occupied")]
    Collision(CellIndex),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("round {0} aborted")]
    RoundAborted(usize),
    #[error("round {0} timed out waiting for the rendezvous")]
    RoundTimedOut(usize),

    #[error("worker {worker} timed out during round {round}")]
    WorkerTimedOut { worker: String, round: usize },
    #[error("worker {worker} failed: {reason}")]
    WorkerFailed { worker: String, reason: String },
    #[error("worker thread panicked")]
    WorkerPanicked,

    #[error("transport error: {0}")]
    Transport(String),
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("io error: {0}")]
    IoError(String),
    #[error("toml deserialization error: {0}")]
    TomlDeserError(#[from] toml::de::Error),
    #[cfg(feature = "yaml")]
    #[error("yaml deserialization error: {0}")]
    YamlDeserError(#[from] serde_yaml::Error),

    #[error("other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether the error only reports that some other party broke the round
    /// first. Used to pick the root cause out of a set of worker results.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Error::RoundAborted(_))
    }
}
