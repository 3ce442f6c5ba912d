//! Byte-exact primitives over a blocking stream socket.
//!
//! Nothing here panics or returns `Err` for transfer problems. Every call
//! reports one of three outcomes: the full request was transferred, the peer
//! went away part way through, or the operating system reported an error.
//! Interrupted system calls are retried transparently.

use std::{
    io::{self, Read, Write},
    net::TcpStream,
    os::fd::{AsRawFd, RawFd},
};

use socket2::SockRef;

const LINE_TERMINATOR: u8 = b'\n';
const DISCARD_CHUNK: usize = 1024;

/// Outcome of [`SocketIO::read_exactly`] and [`SocketIO::write_exactly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Every requested byte was transferred.
    Complete(usize),
    /// The peer shut down after this many bytes.
    Partial(usize),
    /// The OS reported an error other than an interrupt.
    Failed(io::ErrorKind),
}

impl Transfer {
    pub fn is_complete(&self) -> bool {
        matches!(self, Transfer::Complete(_))
    }

    /// Bytes moved before the call returned; zero for failures.
    pub fn transferred(&self) -> usize {
        match *self {
            Transfer::Complete(n) | Transfer::Partial(n) => n,
            Transfer::Failed(_) => 0,
        }
    }

    /// Count encoding used by callers that compare against the requested
    /// size: `requested` on success, less on peer close, `requested + 1` on
    /// error.
    pub fn legacy_count(&self, requested: usize) -> usize {
        match *self {
            Transfer::Complete(n) | Transfer::Partial(n) => n,
            Transfer::Failed(_) => requested + 1,
        }
    }
}

/// Outcome of [`SocketIO::read_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// A full line was consumed; the count includes the terminator.
    Line(usize),
    /// The buffer filled up without a terminator. The bytes were consumed and
    /// whatever else was readable has been discarded. An empty buffer yields
    /// `Unterminated(0)` without reading or discarding anything.
    Unterminated(usize),
    /// The peer closed after this many bytes of an unfinished line.
    Closed(usize),
    /// The buffer is larger than the socket's receive buffer.
    TooLong { max: usize, capacity: usize },
    Failed(io::ErrorKind),
}

impl LineStatus {
    pub fn legacy_count(&self, max: usize) -> usize {
        match *self {
            LineStatus::Line(n) | LineStatus::Unterminated(n) | LineStatus::Closed(n) => n,
            LineStatus::TooLong { .. } | LineStatus::Failed(_) => max + 1,
        }
    }
}

#[derive(Debug)]
pub struct SocketIO {
    stream: TcpStream,
}

impl SocketIO {
    pub fn new(stream: TcpStream) -> Self {
        SocketIO { stream }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Reads until `buf` is full, the peer disconnects or an error occurs.
    pub fn read_exactly(&self, buf: &mut [u8]) -> Transfer {
        let mut stream = &self.stream;
        let mut filled = 0;

        while filled < buf.len() {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => return Transfer::Partial(filled),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Transfer::Failed(e.kind()),
            }
        }

        Transfer::Complete(filled)
    }

    /// Writes all of `buf` unless the peer disconnects or an error occurs.
    pub fn write_exactly(&self, buf: &[u8]) -> Transfer {
        let mut stream = &self.stream;
        let mut written = 0;

        while written < buf.len() {
            match stream.write(&buf[written..]) {
                Ok(0) => return Transfer::Partial(written),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Transfer::Failed(e.kind()),
            }
        }

        Transfer::Complete(written)
    }

    /// Reads one `\n`-terminated line into `buf`, consuming nothing past the
    /// terminator.
    ///
    /// The receive buffer is peeked and only the scanned bytes are consumed,
    /// so data following the line stays queued. `buf.len()` bounds the line
    /// and must not exceed the socket's receive buffer, otherwise the
    /// terminator could never become visible to a peek.
    pub fn read_line(&self, buf: &mut [u8]) -> LineStatus {
        let max = buf.len();
        if max == 0 {
            return LineStatus::Unterminated(0);
        }
        let capacity = match self.recv_buffer_size() {
            Ok(capacity) => capacity,
            Err(e) => return LineStatus::Failed(e.kind()),
        };
        if max > capacity {
            return LineStatus::TooLong { max, capacity };
        }

        let mut total = 0;
        while total < max {
            let peeked = match self.peek(&mut buf[total..]) {
                Ok(0) => return LineStatus::Closed(total),
                Ok(n) => n,
                Err(e) => return LineStatus::Failed(e.kind()),
            };

            let terminator = buf[total..total + peeked]
                .iter()
                .position(|&b| b == LINE_TERMINATOR);
            let scanned = terminator.map_or(peeked, |idx| idx + 1);

            match self.read_exactly(&mut buf[total..total + scanned]) {
                Transfer::Complete(_) => total += scanned,
                Transfer::Partial(n) => return LineStatus::Closed(total + n),
                Transfer::Failed(kind) => return LineStatus::Failed(kind),
            }

            if terminator.is_some() {
                return LineStatus::Line(total);
            }
        }

        // resynchronize: whatever is left belongs to the oversized line
        let _ = self.discard_available();
        LineStatus::Unterminated(total)
    }

    /// Peeks without blocking. `Ok(0)` means the peer has shut down its
    /// write side and nothing is left to read.
    pub fn peek_nonblocking(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_nonblocking(true)?;
        let result = self.peek(buf);
        self.stream.set_nonblocking(false)?;
        result
    }

    /// Drops every byte that is readable right now and returns how many were
    /// discarded.
    pub fn discard_available(&self) -> io::Result<usize> {
        let mut scratch = [0u8; DISCARD_CHUNK];
        let mut stream = &self.stream;
        let mut discarded = 0;

        self.stream.set_nonblocking(true)?;
        let result = loop {
            match stream.read(&mut scratch) {
                Ok(0) => break Ok(discarded),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(discarded),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        result
    }

    /// SO_RCVBUF as reported by the kernel.
    pub fn recv_buffer_size(&self) -> io::Result<usize> {
        SockRef::from(&self.stream).recv_buffer_size()
    }

    fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.stream.peek(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }
}

impl AsRawFd for SocketIO {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    pub(crate) fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_exact_round_trip_through_tiny_buffers() {
        let (client, server) = socket_pair();
        SockRef::from(&client).set_send_buffer_size(4096).unwrap();
        SockRef::from(&server).set_recv_buffer_size(4096).unwrap();

        let payload: Vec<u8> = (0..512 * 1024).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let writer = thread::spawn(move || {
            let io = SocketIO::new(client);
            io.write_exactly(&payload)
        });

        let io = SocketIO::new(server);
        let mut received = vec![0u8; expected.len()];
        assert_eq!(
            io.read_exactly(&mut received),
            Transfer::Complete(expected.len())
        );
        assert_eq!(
            writer.join().unwrap(),
            Transfer::Complete(expected.len())
        );
        assert_eq!(received, expected);
    }

    #[test]
    fn test_read_exactly_reports_peer_close() {
        let (client, server) = socket_pair();
        {
            let mut client = client;
            client.write_all(b"abc").unwrap();
        }

        let io = SocketIO::new(server);
        let mut buf = [0u8; 8];
        let result = io.read_exactly(&mut buf);
        assert_eq!(result, Transfer::Partial(3));
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(result.legacy_count(8), 3);
    }

    #[test]
    fn test_write_exactly_reports_failure_after_reset() {
        let (client, server) = socket_pair();
        drop(client);
        thread::sleep(Duration::from_millis(50));

        let io = SocketIO::new(server);
        let chunk = vec![7u8; 64 * 1024];
        let mut outcome = Transfer::Complete(0);
        for _ in 0..100 {
            outcome = io.write_exactly(&chunk);
            if !outcome.is_complete() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(outcome, Transfer::Failed(_)));
        assert_eq!(outcome.legacy_count(chunk.len()), chunk.len() + 1);
    }

    #[test]
    fn test_empty_transfers_complete_immediately() {
        let (_client, server) = socket_pair();
        let io = SocketIO::new(server);
        assert_eq!(io.read_exactly(&mut []), Transfer::Complete(0));
        assert_eq!(io.write_exactly(&[]), Transfer::Complete(0));
    }

    #[test]
    fn test_read_line_leaves_following_data_queued() {
        let (mut client, server) = socket_pair();
        client.write_all(b"hello\nworld\n").unwrap();

        let io = SocketIO::new(server);
        let mut buf = [0u8; 64];
        assert_eq!(io.read_line(&mut buf), LineStatus::Line(6));
        assert_eq!(&buf[..6], b"hello\n");
        assert_eq!(io.read_line(&mut buf), LineStatus::Line(6));
        assert_eq!(&buf[..6], b"world\n");
    }

    #[test]
    fn test_read_line_discards_unterminated_remainder() {
        let (mut client, server) = socket_pair();
        client.write_all(b"abcdefgh").unwrap();
        thread::sleep(Duration::from_millis(20));

        let io = SocketIO::new(server);
        let mut buf = [0u8; 4];
        assert_eq!(io.read_line(&mut buf), LineStatus::Unterminated(4));
        assert_eq!(&buf, b"abcd");

        client.write_all(b"ok\n").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(io.read_line(&mut buf), LineStatus::Line(3));
        assert_eq!(&buf[..3], b"ok\n");
    }

    #[test]
    fn test_read_line_with_empty_buffer_leaves_stream_untouched() {
        let (mut client, server) = socket_pair();
        client.write_all(b"abc\n").unwrap();
        thread::sleep(Duration::from_millis(20));

        let io = SocketIO::new(server);
        assert_eq!(io.read_line(&mut []), LineStatus::Unterminated(0));

        let mut buf = [0u8; 16];
        assert_eq!(io.read_line(&mut buf), LineStatus::Line(4));
        assert_eq!(&buf[..4], b"abc\n");
    }

    #[test]
    fn test_read_line_reports_close_mid_line() {
        let (client, server) = socket_pair();
        {
            let mut client = client;
            client.write_all(b"par").unwrap();
        }

        let io = SocketIO::new(server);
        let mut buf = [0u8; 16];
        assert_eq!(io.read_line(&mut buf), LineStatus::Closed(3));
    }

    #[test]
    fn test_read_line_rejects_buffer_larger_than_socket() {
        let (_client, server) = socket_pair();
        let io = SocketIO::new(server);
        let capacity = io.recv_buffer_size().unwrap();
        let mut buf = vec![0u8; capacity + 1];

        let status = io.read_line(&mut buf);
        assert_eq!(
            status,
            LineStatus::TooLong {
                max: capacity + 1,
                capacity
            }
        );
        assert_eq!(status.legacy_count(buf.len()), buf.len() + 1);
    }

    #[test]
    fn test_peek_nonblocking_distinguishes_idle_data_and_close() {
        let (mut client, server) = socket_pair();
        let io = SocketIO::new(server);
        let mut buf = [0u8; 8];

        let idle = io.peek_nonblocking(&mut buf).unwrap_err();
        assert_eq!(idle.kind(), io::ErrorKind::WouldBlock);

        client.write_all(b"z").unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(io.peek_nonblocking(&mut buf).unwrap(), 1);
        // peeking consumed nothing
        assert_eq!(io.read_exactly(&mut buf[..1]), Transfer::Complete(1));

        drop(client);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(io.peek_nonblocking(&mut buf).unwrap(), 0);
    }
}
