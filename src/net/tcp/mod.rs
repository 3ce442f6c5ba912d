//! Framed TCP server on top of the single-threaded reactor.
//!
//! Every accepted connection gets a [`ConnectionId`] and lives in the
//! reactor's connection table until its peer disconnects. The table belongs to
//! the reactor thread alone; worker threads only ever see
//! `Arc<TcpConnection>` and reply through
//! [`TcpConnection::notify_loop`].
//!
//! ```text
//! Connection Storage (reactor thread only):
//!   HashMap<Token, Arc<TcpConnection>>
//!        │
//!        ├──> Token(2) ──> TcpConnection { socket, addrs, callbacks }
//!        ├──> Token(3) ──> TcpConnection { socket, addrs, callbacks }
//!        └──> Token(N) ──> TcpConnection { socket, addrs, callbacks }
//! ```
//!
//! ## Request Pipeline
//!
//! ```text
//! reactor:  readable ──> on_message ──> recv() frame ──> pool.submit(task)
//! worker:   task ──> Service::call ──> conn.notify_loop(response)
//!               ├─ 1. append send(response) to the pending queue
//!               └─ 2. signal the wakeup channel
//! reactor:  wakeup ──> drain queue ──> send(response)
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use mill_frame::net::tcp::config::TcpServerConfig;
//! # use std::sync::Arc;
//! # use mill_frame::net::tcp::traits::NoOpLogger;
//! # use std::time::Duration;
//!
//! let config = TcpServerConfig::builder()
//!     .address("0.0.0.0:8080".parse().unwrap())
//!     .backlog(256)
//!     .poll_timeout(Duration::from_secs(1))
//!     .max_frame_len(1 << 20)
//!     .logger(Arc::new(NoOpLogger))
//!     .build();
//! ```

pub mod config;
pub mod connection;
pub mod service;
pub mod traits;

use std::net::SocketAddr;
use std::sync::Arc;

pub use config::TcpServerConfig;
pub use connection::{Liveness, TcpConnection};
pub use service::Service;
pub use traits::ConnectionId;

use crate::error::Result;
use crate::handler::{Callbacks, ConnectionHandler};
use crate::net::acceptor::Acceptor;
use crate::reactor::{EventLoop, LoopHandle};
use crate::thread_pool::WorkerPool;
use traits::Logger;

/// Binds one [`Acceptor`] to one [`EventLoop`].
///
/// The listening socket is bound by [`new`](Self::new); [`start`](Self::start)
/// then blocks the calling thread, which becomes the reactor thread, until
/// [`stop`](Self::stop) or a [`LoopHandle::unloop`] from elsewhere.
pub struct TcpServer {
    event_loop: EventLoop,
    local_addr: SocketAddr,
    logger: Arc<dyn Logger>,
}

impl TcpServer {
    pub fn new(config: TcpServerConfig) -> Result<Self> {
        config.validate()?;
        let acceptor = Acceptor::bind(&config)?;
        let local_addr = acceptor.local_addr()?;
        let event_loop = EventLoop::new(acceptor, &config)?;

        Ok(Self {
            event_loop,
            local_addr,
            logger: config.logger,
        })
    }

    /// The bound address, with an ephemeral port already resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn set_connection_callback<F>(&mut self, callback: F)
    where
        F: Fn(&Arc<TcpConnection>) + Send + Sync + 'static,
    {
        self.event_loop.callbacks_mut().on_connect = Some(Arc::new(callback));
    }

    pub fn set_message_callback<F>(&mut self, callback: F)
    where
        F: Fn(&Arc<TcpConnection>) + Send + Sync + 'static,
    {
        self.event_loop.callbacks_mut().on_message = Some(Arc::new(callback));
    }

    pub fn set_close_callback<F>(&mut self, callback: F)
    where
        F: Fn(&Arc<TcpConnection>) + Send + Sync + 'static,
    {
        self.event_loop.callbacks_mut().on_close = Some(Arc::new(callback));
    }

    /// Installs all three callbacks from one handler.
    pub fn set_handler<H: ConnectionHandler>(&mut self, handler: Arc<H>) {
        self.event_loop.set_callbacks(Callbacks::from_handler(handler));
    }

    /// Serves framed requests: each frame is read on the reactor, handed to
    /// `service` on `pool`, and the response is framed back to the sender.
    ///
    /// Replaces the message callback; connect and close callbacks are kept.
    pub fn serve<S, P>(&mut self, service: Arc<S>, pool: Arc<P>)
    where
        S: Service + ?Sized,
        P: WorkerPool + ?Sized,
    {
        let dispatcher = service::frame_dispatcher(service, pool, self.logger.clone());
        self.event_loop.callbacks_mut().on_message = Some(dispatcher);
    }

    pub fn handle(&self) -> LoopHandle {
        self.event_loop.handle()
    }

    pub fn connection_count(&self) -> usize {
        self.event_loop.connection_count()
    }

    /// Runs the reactor on the calling thread.
    pub fn start(&mut self) -> Result<()> {
        self.logger.log(
            traits::LogLevel::Info,
            &format!("server listening on {}", self.local_addr),
        );
        self.event_loop.run()
    }

    /// Clears the running flag. While [`start`](Self::start) is blocking, stop
    /// through a [`LoopHandle`] taken from [`handle`](Self::handle) instead.
    pub fn stop(&self) {
        self.event_loop.stop();
    }
}
