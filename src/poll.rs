use std::{io, os::fd::RawFd, time::Duration};

use mio::{unix::SourceFd, Events, Interest, Poll, Registry, Token};

/// Wraps the `mio` poller together with its readiness buffer.
///
/// The buffer starts at the configured capacity and doubles after any poll
/// that filled it completely, so a burst of ready sources is never left
/// waiting behind a buffer that is too small.
pub struct PollHandle {
    poller: Poll,
    events: Events,
    capacity: usize,
    filled: bool,
}

impl PollHandle {
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(PollHandle {
            poller: Poll::new()?,
            events: Events::with_capacity(capacity),
            capacity,
            filled: false,
        })
    }

    pub fn registry(&self) -> &Registry {
        self.poller.registry()
    }

    pub fn register_fd(&self, fd: RawFd, token: Token) -> io::Result<()> {
        self.poller
            .registry()
            .register(&mut SourceFd(&fd), token, Interest::READABLE)
    }

    /// Re-arms an edge-triggered source; readiness that is still pending is
    /// reported again by the next poll.
    pub fn reregister_fd(&self, fd: RawFd, token: Token) -> io::Result<()> {
        self.poller
            .registry()
            .reregister(&mut SourceFd(&fd), token, Interest::READABLE)
    }

    pub fn deregister_fd(&self, fd: RawFd) -> io::Result<()> {
        self.poller.registry().deregister(&mut SourceFd(&fd))
    }

    /// Blocks for at most `timeout` and returns the number of ready events.
    /// Signal interruptions are retried.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        if self.filled {
            self.capacity *= 2;
            self.events = Events::with_capacity(self.capacity);
        }

        loop {
            match self.poller.poll(&mut self.events, timeout) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let ready = self.events.iter().count();
        self.filled = ready == self.capacity;
        Ok(ready)
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
