use mio::Token;

/// Unique identifier for connections.
///
/// Assigned by the reactor when a connection is accepted and never reused
/// while the server runs. The id doubles as the connection's poll token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        ConnectionId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn token(&self) -> Token {
        Token(self.0 as usize)
    }
}

/// Log levels for reactor and connection events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Logger trait for network events
///
/// The server and every connection receive the logger from
/// [`TcpServerConfig`](super::config::TcpServerConfig), so embedding
/// applications decide where reactor diagnostics go.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Default no-op logger that discards all messages
#[derive(Debug, Default, Clone)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Forwards every message to the `tracing` macros under the `mill_frame` target.
#[derive(Debug, Default, Clone)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "mill_frame", "{message}"),
            LogLevel::Info => tracing::info!(target: "mill_frame", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "mill_frame", "{message}"),
            LogLevel::Error => tracing::error!(target: "mill_frame", "{message}"),
        }
    }
}
