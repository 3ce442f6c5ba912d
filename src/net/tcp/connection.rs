use std::{
    io,
    net::{Shutdown, SocketAddr, TcpStream},
    os::fd::{AsRawFd, RawFd},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::error::{NetworkError, Result};
use crate::handler::{Callbacks, ConnectionCallback};
use crate::net::frame::{decode_header, encode_header, HEADER_LEN};
use crate::net::socket_io::{LineStatus, SocketIO, Transfer};
use crate::net::tcp::config::TcpServerConfig;
use crate::net::tcp::traits::{ConnectionId, LogLevel, Logger};
use crate::reactor::LoopHandle;

/// Result of the non-consuming liveness peek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Data is waiting to be read.
    Readable,
    /// Connected, nothing to read right now.
    Idle,
    /// The peer shut down its write side or the socket failed.
    Closed,
}

/// Per-connection limits and logger, taken from the server configuration.
#[derive(Clone)]
pub(crate) struct ConnectionOptions {
    pub logger: Arc<dyn Logger>,
    pub max_frame_len: usize,
    pub max_line_len: usize,
}

impl From<&TcpServerConfig> for ConnectionOptions {
    fn from(config: &TcpServerConfig) -> Self {
        ConnectionOptions {
            logger: config.logger.clone(),
            max_frame_len: config.max_frame_len,
            max_line_len: config.max_line_len,
        }
    }
}

/// One accepted TCP connection.
///
/// The reactor's connection table owns it while the peer is connected;
/// worker tasks hold additional `Arc`s while they compute a response, so the
/// socket stays open until the last task finishes even if the connection has
/// already been removed from the table.
///
/// Socket operations (`send`, `recv`, `recv_line`, `shutdown`) must only be
/// called on the reactor thread, i.e. from a lifecycle callback or from a
/// pending callback. Worker threads reply through
/// [`notify_loop`](Self::notify_loop).
pub struct TcpConnection {
    id: ConnectionId,
    io: SocketIO,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    disconnected: AtomicBool,
    callbacks: Callbacks,
    loop_handle: LoopHandle,
    options: ConnectionOptions,
}

impl TcpConnection {
    pub(crate) fn new(
        id: ConnectionId,
        stream: TcpStream,
        callbacks: Callbacks,
        loop_handle: LoopHandle,
        options: ConnectionOptions,
    ) -> io::Result<Self> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        Ok(TcpConnection {
            id,
            io: SocketIO::new(stream),
            local_addr,
            peer_addr,
            disconnected: AtomicBool::new(false),
            callbacks,
            loop_handle,
            options,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn show(&self) -> String {
        format!(
            "[tcp] (local) {} --> (peer) {}",
            self.local_addr, self.peer_addr
        )
    }

    /// Writes one frame: the length header, then the payload.
    ///
    /// The returned counts cover the whole frame, header included.
    pub fn send(&self, payload: &[u8]) -> Transfer {
        let header = encode_header(payload.len());
        let outcome = match self.io.write_exactly(&header) {
            Transfer::Complete(_) => match self.io.write_exactly(payload) {
                Transfer::Complete(n) => Transfer::Complete(HEADER_LEN + n),
                Transfer::Partial(n) => Transfer::Partial(HEADER_LEN + n),
                failed => failed,
            },
            other => other,
        };

        match outcome {
            Transfer::Complete(_) => {}
            Transfer::Partial(n) => self.log(
                LogLevel::Warn,
                &format!(
                    "{}: peer closed after {} of {} frame bytes",
                    self.show(),
                    n,
                    HEADER_LEN + payload.len()
                ),
            ),
            Transfer::Failed(kind) => self.log(
                LogLevel::Error,
                &format!("{}: send failed: {}", self.show(), io::Error::from(kind)),
            ),
        }
        outcome
    }

    /// Reads one frame and returns its payload.
    ///
    /// A peer that disconnects mid-frame yields [`NetworkError::PeerClosed`];
    /// a header announcing more than `max_frame_len` bytes yields
    /// [`NetworkError::Protocol`] and leaves the payload unread.
    pub fn recv(&self) -> Result<Vec<u8>> {
        let mut header = [0u8; HEADER_LEN];
        self.read_part(&mut header)?;

        let len = decode_header(header);
        if len > self.options.max_frame_len {
            let message = format!(
                "{}: frame of {} bytes exceeds the {} byte limit",
                self.show(),
                len,
                self.options.max_frame_len
            );
            self.log(LogLevel::Warn, &message);
            return Err(NetworkError::Protocol(message));
        }

        let mut payload = vec![0u8; len];
        self.read_part(&mut payload)?;
        Ok(payload)
    }

    /// Reads one `\n`-terminated line and returns its bytes without the
    /// terminator. The bytes are not required to be UTF-8.
    ///
    /// Returns `None` when the line does not fit in `max_line_len` bytes, the
    /// peer disconnects first or the read fails.
    pub fn recv_line(&self) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; self.options.max_line_len];
        match self.io.read_line(&mut buf) {
            LineStatus::Line(n) => {
                buf.truncate(n - 1);
                Some(buf)
            }
            LineStatus::Unterminated(n) => {
                self.log(
                    LogLevel::Warn,
                    &format!("{}: {} bytes without a line terminator", self.show(), n),
                );
                None
            }
            LineStatus::Closed(_) => None,
            LineStatus::TooLong { max, capacity } => {
                self.log(
                    LogLevel::Error,
                    &format!(
                        "{}: line buffer of {} bytes exceeds the {} byte receive buffer",
                        self.show(),
                        max,
                        capacity
                    ),
                );
                None
            }
            LineStatus::Failed(kind) => {
                self.log(
                    LogLevel::Error,
                    &format!("{}: readline failed: {}", self.show(), io::Error::from(kind)),
                );
                None
            }
        }
    }

    /// Non-blocking, non-consuming liveness check.
    pub fn liveness(&self) -> Liveness {
        let mut probe = [0u8; 1];
        match self.io.peek_nonblocking(&mut probe) {
            Ok(0) => Liveness::Closed,
            Ok(_) => Liveness::Readable,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Liveness::Idle,
            Err(e) => {
                self.log(
                    LogLevel::Warn,
                    &format!("{}: liveness check failed: {}", self.show(), e),
                );
                Liveness::Closed
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.liveness() == Liveness::Closed
    }

    /// True once the reactor has seen the peer finish sending and dispatched
    /// the close callback. The write side may still be open.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Shuts both directions down. The reactor notices on the next liveness
    /// check and runs the close path.
    pub fn shutdown(&self) -> io::Result<()> {
        match self.io.stream().shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    /// Hands a response back to the reactor thread for sending.
    ///
    /// Safe to call from any thread. The send is queued before the reactor is
    /// woken. The send is attempted even after the close callback has run: a
    /// peer that only shut down its write side still receives the response,
    /// and a peer that is really gone shows up as a failed send.
    pub fn notify_loop(self: &Arc<Self>, payload: Vec<u8>) -> Result<()> {
        let conn = Arc::clone(self);
        self.loop_handle.run_in_loop(move || {
            if !conn.send(&payload).is_complete() && conn.is_disconnected() {
                conn.log(
                    LogLevel::Debug,
                    &format!(
                        "{}: {} byte response not delivered, peer is gone",
                        conn.show(),
                        payload.len()
                    ),
                );
            }
        })
    }

    pub fn loop_handle(&self) -> &LoopHandle {
        &self.loop_handle
    }

    pub(crate) fn mark_disconnected(&self) {
        self.disconnected.store(true, Ordering::Release);
    }

    pub(crate) fn handle_connect(self: &Arc<Self>) {
        self.invoke(self.callbacks.on_connect.as_ref());
    }

    pub(crate) fn handle_message(self: &Arc<Self>) {
        self.invoke(self.callbacks.on_message.as_ref());
    }

    pub(crate) fn handle_close(self: &Arc<Self>) {
        self.invoke(self.callbacks.on_close.as_ref());
    }

    fn invoke(self: &Arc<Self>, callback: Option<&ConnectionCallback>) {
        if let Some(callback) = callback {
            callback(self);
        }
    }

    fn read_part(&self, buf: &mut [u8]) -> Result<()> {
        match self.io.read_exactly(buf) {
            Transfer::Complete(_) => Ok(()),
            Transfer::Partial(received) => Err(NetworkError::PeerClosed {
                received,
                expected: buf.len(),
            }),
            Transfer::Failed(kind) => {
                self.log(
                    LogLevel::Error,
                    &format!("{}: recv failed: {}", self.show(), io::Error::from(kind)),
                );
                Err(NetworkError::io_kind(kind))
            }
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.options.logger.log(level, message);
    }
}

impl AsRawFd for TcpConnection {
    fn as_raw_fd(&self) -> RawFd {
        self.io.as_raw_fd()
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("id", &self.id)
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}
