//! # mill-frame
//! A single-reactor TCP server for length-prefixed messages, built on top of
//! [`mio`].
//!
//! One thread owns every socket. It accepts connections, reads frames and
//! writes responses; the computation in between runs on a worker pool, and
//! workers never touch a socket. A finished task hands its response back by
//! appending a send to the reactor's pending queue and signalling the wakeup
//! channel, and the reactor drains the queue on its own thread.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────┐    ┌──────────────┐    ┌───────────────┐
//! │  TcpServer  │───▶│  EventLoop   │───▶│  PollHandle   │
//! └─────────────┘    └──────────────┘    └───────────────┘
//!        │             │    ▲    │
//!        │             │    │    └──────▶ Acceptor / TcpConnection
//!        ▼             ▼    │
//! ┌─────────────┐    ┌──────────────┐
//! │ ThreadPool  │───▶│ PendingQueue │  (+ WakeupChannel)
//! └─────────────┘    └──────────────┘
//! ```
//!
//! ## Wire format
//!
//! Every message is a native `usize` length header in native byte order
//! followed by exactly that many payload bytes. See [`net::frame`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mill_frame::prelude::*;
//!
//! fn main() -> mill_frame::error::Result<()> {
//!     let config = TcpServerConfig::builder()
//!         .address("127.0.0.1:8080".parse().unwrap())
//!         .build();
//!
//!     let mut server = TcpServer::new(config)?;
//!     let pool = Arc::new(ThreadPool::new(4)?);
//!     server.serve(Arc::new(|request: Vec<u8>| request), pool);
//!
//!     // blocks until another thread calls `stop` through a handle
//!     server.start()
//! }
//! ```
//!
//! Callbacks can be installed directly when the reply is computed on the
//! reactor thread:
//!
//! ```rust,no_run
//! use mill_frame::prelude::*;
//!
//! fn main() -> mill_frame::error::Result<()> {
//!     let mut server = TcpServer::new(TcpServerConfig::default())?;
//!     server.set_message_callback(|conn| {
//!         if let Ok(payload) = conn.recv() {
//!             conn.send(&payload);
//!         }
//!     });
//!     server.start()
//! }
//! ```
//!
//! - [`TcpServer`]: binds the listener and runs the reactor
//! - [`reactor`]: the event loop and its cross-thread [`LoopHandle`]
//! - [`net`]: listener, socket I/O, frame format and connections
//! - [`pending`]: the pending queue and wakeup channel
//! - [`thread_pool`]: the worker pool
//! - [`error`]: error types and result handling

pub mod error;
pub mod handler;
pub mod net;
pub mod pending;
pub mod poll;
pub mod reactor;
pub mod thread_pool;

pub use handler::{Callbacks, ConnectionHandler};
pub use net::socket_io::{LineStatus, SocketIO, Transfer};
pub use net::tcp::{Service, TcpConnection, TcpServer, TcpServerConfig};
pub use reactor::{EventLoop, LoopHandle};
pub use thread_pool::{ThreadPool, WorkerPool};

/// A convenient prelude module that re-exports commonly used types and traits.
///
/// ```rust
/// use mill_frame::prelude::*;
/// ```
pub mod prelude {
    pub use crate::handler::ConnectionHandler;
    pub use crate::net::socket_io::{LineStatus, Transfer};
    pub use crate::net::tcp::traits::{ConnectionId, LogLevel, Logger, NoOpLogger, TracingLogger};
    pub use crate::net::tcp::{Service, TcpConnection, TcpServer, TcpServerConfig};
    pub use crate::reactor::LoopHandle;
    pub use crate::thread_pool::{ThreadPool, WorkerPool};
}
