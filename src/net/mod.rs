//! Socket plumbing: the listener, exact-length socket I/O, the frame format
//! and the framed TCP server built from them.
//!
//! ```text
//!  Acceptor ──accept──> TcpStream ──> SocketIO ──> TcpConnection ──> TcpServer
//!                                       │              │
//!                                  read_exactly      send / recv
//!                                  write_exactly     (frame.rs header)
//!                                  read_line
//! ```

pub mod acceptor;
pub mod frame;
pub mod socket_io;
pub mod tcp;
