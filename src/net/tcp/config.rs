use std::{net::SocketAddr, sync::Arc, time::Duration};

use crate::error::{NetworkError, Result};
use crate::net::tcp::traits::{Logger, TracingLogger};

pub const DEFAULT_BACKLOG: i32 = 128;
pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MESSAGES_PER_EVENT: usize = 64;
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// Configuration for the framed TCP server.
///
/// Controls the listening socket, the reactor's polling behaviour and the
/// limits applied by the wire protocol. Use `TcpServerConfig::builder()` for
/// ergonomic construction.
///
/// ## Socket Options
///
/// - reuse_address: sets SO_REUSEADDR on the listener before bind
/// - no_delay: disables Nagle's algorithm on accepted sockets (default)
/// - io_timeout: read/write timeout on accepted sockets; a stalled peer then
///   surfaces as an I/O error instead of blocking the reactor
///
/// ## Reactor
///
/// - events_capacity: initial size of the readiness buffer, doubled on demand
/// - poll_timeout: upper bound on a single multiplexer wait
/// - messages_per_event: how many message callbacks one readiness event may
///   drive before the connection is re-armed
///
/// ## Protocol Limits
///
/// - max_frame_len: frames announcing a longer payload are rejected
/// - max_line_len: buffer size used by `recv_line`
#[derive(Clone)]
pub struct TcpServerConfig {
    /// Address to bind to
    pub address: SocketAddr,
    /// listen(2) backlog
    pub backlog: i32,
    /// SO_REUSEADDR on the listener
    pub reuse_address: bool,
    /// Enable TCP_NODELAY
    pub no_delay: bool,
    /// SO_RCVTIMEO / SO_SNDTIMEO on accepted sockets
    pub io_timeout: Option<Duration>,
    /// Initial readiness buffer capacity
    pub events_capacity: usize,
    /// Multiplexer wait bound
    pub poll_timeout: Duration,
    /// Message callbacks per readiness event
    pub messages_per_event: usize,
    /// Largest accepted frame payload
    pub max_frame_len: usize,
    /// Line buffer size for the line sub-protocol
    pub max_line_len: usize,
    /// Logger for network events
    pub logger: Arc<dyn Logger>,
}

impl TcpServerConfig {
    /// Create a new builder for TcpServerConfig
    pub fn builder() -> TcpServerConfigBuilder {
        TcpServerConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.events_capacity == 0 {
            return Err(NetworkError::Configuration(
                "events_capacity must be greater than zero".into(),
            ));
        }
        if self.messages_per_event == 0 {
            return Err(NetworkError::Configuration(
                "messages_per_event must be greater than zero".into(),
            ));
        }
        if self.max_line_len == 0 {
            return Err(NetworkError::Configuration(
                "max_line_len must be greater than zero".into(),
            ));
        }
        if self.backlog <= 0 {
            return Err(NetworkError::Configuration(format!(
                "backlog must be positive, got {}",
                self.backlog
            )));
        }
        if self.io_timeout == Some(Duration::ZERO) {
            return Err(NetworkError::Configuration(
                "io_timeout must not be zero, use None to disable it".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            backlog: DEFAULT_BACKLOG,
            reuse_address: true,
            no_delay: true,
            io_timeout: None,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            messages_per_event: DEFAULT_MESSAGES_PER_EVENT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            logger: Arc::new(TracingLogger),
        }
    }
}

/// Builder for TcpServerConfig using the builder pattern.
///
/// All fields are optional and will use defaults from TcpServerConfig::default()
/// if not explicitly set.
#[derive(Default)]
pub struct TcpServerConfigBuilder {
    address: Option<SocketAddr>,
    backlog: Option<i32>,
    reuse_address: Option<bool>,
    no_delay: Option<bool>,
    io_timeout: Option<Option<Duration>>,
    events_capacity: Option<usize>,
    poll_timeout: Option<Duration>,
    messages_per_event: Option<usize>,
    max_frame_len: Option<usize>,
    max_line_len: Option<usize>,
    logger: Option<Arc<dyn Logger>>,
}

impl TcpServerConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address to bind to
    pub fn address(mut self, address: SocketAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = Some(backlog);
        self
    }

    pub fn reuse_address(mut self, enabled: bool) -> Self {
        self.reuse_address = Some(enabled);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = Some(enabled);
        self
    }

    pub fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = Some(capacity);
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    pub fn messages_per_event(mut self, limit: usize) -> Self {
        self.messages_per_event = Some(limit);
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = Some(len);
        self
    }

    pub fn max_line_len(mut self, len: usize) -> Self {
        self.max_line_len = Some(len);
        self
    }

    /// Set the logger implementation
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the TcpServerConfig
    pub fn build(self) -> TcpServerConfig {
        let default = TcpServerConfig::default();
        TcpServerConfig {
            address: self.address.unwrap_or(default.address),
            backlog: self.backlog.unwrap_or(default.backlog),
            reuse_address: self.reuse_address.unwrap_or(default.reuse_address),
            no_delay: self.no_delay.unwrap_or(default.no_delay),
            io_timeout: self.io_timeout.unwrap_or(default.io_timeout),
            events_capacity: self.events_capacity.unwrap_or(default.events_capacity),
            poll_timeout: self.poll_timeout.unwrap_or(default.poll_timeout),
            messages_per_event: self
                .messages_per_event
                .unwrap_or(default.messages_per_event),
            max_frame_len: self.max_frame_len.unwrap_or(default.max_frame_len),
            max_line_len: self.max_line_len.unwrap_or(default.max_line_len),
            logger: self.logger.unwrap_or(default.logger),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = TcpServerConfig::builder().build();
        assert_eq!(config.backlog, DEFAULT_BACKLOG);
        assert_eq!(config.poll_timeout, DEFAULT_POLL_TIMEOUT);
        assert_eq!(config.max_line_len, DEFAULT_MAX_LINE_LEN);
        assert!(config.reuse_address);
        assert!(config.io_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = TcpServerConfig::builder()
            .address("0.0.0.0:9000".parse().unwrap())
            .events_capacity(2)
            .poll_timeout(Duration::from_millis(20))
            .io_timeout(Some(Duration::from_secs(1)))
            .build();
        assert_eq!(config.address.port(), 9000);
        assert_eq!(config.events_capacity, 2);
        assert_eq!(config.poll_timeout, Duration::from_millis(20));
        assert_eq!(config.io_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = TcpServerConfig::builder().events_capacity(0).build();
        assert!(matches!(
            config.validate(),
            Err(NetworkError::Configuration(_))
        ));

        let config = TcpServerConfig::builder().messages_per_event(0).build();
        assert!(config.validate().is_err());

        let config = TcpServerConfig::builder()
            .io_timeout(Some(Duration::ZERO))
            .build();
        assert!(config.validate().is_err());
    }
}
