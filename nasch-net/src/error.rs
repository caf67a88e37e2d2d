use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Enumeration of errors that may occur during network operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("timed out")]
    TimedOut,
    #[error("host unreachable")]
    HostUnreachable,
    #[error("handshake failed, got: {0}")]
    HandshakeFailed(String),
    #[error("frame of {0} bytes exceeds the size limit")]
    FrameTooLarge(usize),
    #[error("unexpected sequence id: expected {expected}, got {got}")]
    SequenceMismatch { expected: u32, got: u32 },

    #[error("other: {0}")]
    Other(String),

    #[error("failed parsing address: {0}")]
    AddrParseError(#[from] std::net::AddrParseError),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("bincode error: {0}")]
    BincodeError(#[from] bincode::Error),

    #[error("core error: {0}")]
    CoreError(#[from] nasch_core::error::Error),
}

impl From<Error> for nasch_core::error::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::CoreError(e) => e,
            e => nasch_core::error::Error::Transport(e.to_string()),
        }
    }
}
