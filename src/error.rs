use std::{io, result::Result as StdResult};

use thiserror::Error;

pub type Result<T> = StdResult<T, NetworkError>;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("peer closed the connection after {received} of {expected} bytes")]
    PeerClosed { received: usize, expected: usize },
    #[error("Protocol Error: {0}")]
    Protocol(String),
    #[error("Configuration Error: {0}")]
    Configuration(String),
    #[error("worker pool is closed")]
    PoolClosed,
    #[error("Lock Poisoned: {0}")]
    PoisonedLock(String),
}

impl NetworkError {
    pub(crate) fn io_kind(kind: io::ErrorKind) -> Self {
        NetworkError::Io(io::Error::from(kind))
    }
}

impl<T> From<std::sync::PoisonError<T>> for NetworkError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        NetworkError::PoisonedLock(err.to_string())
    }
}
