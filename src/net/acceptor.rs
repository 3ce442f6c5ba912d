use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream},
    os::fd::{AsRawFd, RawFd},
    time::Duration,
};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::Result;
use crate::net::tcp::config::TcpServerConfig;

/// Owns the listening socket.
///
/// The socket is bound and listening as soon as the acceptor exists, so the
/// reactor only ever registers a listening handle. The listener itself is
/// non-blocking; accepted sockets are switched to blocking mode because the
/// framing layer reads and writes whole frames synchronously.
#[derive(Debug)]
pub struct Acceptor {
    listener: TcpListener,
    no_delay: bool,
    io_timeout: Option<Duration>,
}

impl Acceptor {
    pub fn bind(config: &TcpServerConfig) -> Result<Self> {
        let address = config.address;
        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(config.reuse_address)?;
        socket.bind(&address.into())?;
        socket.listen(config.backlog)?;
        socket.set_nonblocking(true)?;

        Ok(Acceptor {
            listener: socket.into(),
            no_delay: config.no_delay,
            io_timeout: config.io_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts one pending connection. `WouldBlock` means none is pending.
    pub fn accept(&self) -> io::Result<TcpStream> {
        let stream = loop {
            match self.listener.accept() {
                Ok((stream, _)) => break stream,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        // BSD-derived systems let the listener's O_NONBLOCK leak into the
        // accepted socket
        stream.set_nonblocking(false)?;
        stream.set_nodelay(self.no_delay)?;
        stream.set_read_timeout(self.io_timeout)?;
        stream.set_write_timeout(self.io_timeout)?;
        Ok(stream)
    }
}

impl AsRawFd for Acceptor {
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tcp::traits::NoOpLogger;
    use std::sync::Arc;

    fn config() -> TcpServerConfig {
        TcpServerConfig::builder()
            .address("127.0.0.1:0".parse().unwrap())
            .io_timeout(Some(Duration::from_millis(250)))
            .logger(Arc::new(NoOpLogger))
            .build()
    }

    #[test]
    fn test_bind_resolves_ephemeral_port() {
        let acceptor = Acceptor::bind(&config()).unwrap();
        assert_ne!(acceptor.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_accept_without_pending_connection_would_block() {
        let acceptor = Acceptor::bind(&config()).unwrap();
        let err = acceptor.accept().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_accepted_socket_is_blocking_with_options() {
        let acceptor = Acceptor::bind(&config()).unwrap();
        let _client = TcpStream::connect(acceptor.local_addr().unwrap()).unwrap();

        let mut accepted = None;
        for _ in 0..100 {
            match acceptor.accept() {
                Ok(stream) => {
                    accepted = Some(stream);
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5))
                }
                Err(e) => panic!("accept failed: {e}"),
            }
        }
        let stream = accepted.expect("connection was never accepted");
        assert!(stream.nodelay().unwrap());
        assert_eq!(
            stream.read_timeout().unwrap(),
            Some(Duration::from_millis(250))
        );
    }
}
