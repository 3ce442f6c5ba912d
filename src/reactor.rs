use std::{
    collections::HashMap,
    io,
    net::TcpStream,
    os::fd::AsRawFd,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use mio::{Registry, Token};

use crate::{
    error::Result,
    handler::Callbacks,
    net::{
        acceptor::Acceptor,
        tcp::{
            config::TcpServerConfig,
            connection::{ConnectionOptions, Liveness, TcpConnection},
            traits::{ConnectionId, LogLevel},
        },
    },
    pending::{PendingCallback, PendingQueue, WakeupChannel},
    poll::PollHandle,
};

pub const LISTENER_TOKEN: Token = Token(0);
pub const WAKEUP_TOKEN: Token = Token(1);
const FIRST_CONNECTION_ID: u64 = 2;

struct LoopShared {
    pending: PendingQueue,
    wakeup: WakeupChannel,
    running: AtomicBool,
}

/// Cloneable, thread-safe handle onto an [`EventLoop`].
///
/// This is the only way other threads interact with the reactor: queueing
/// pending callbacks, waking it up and stopping it.
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<LoopShared>,
}

impl LoopHandle {
    pub(crate) fn new(registry: &Registry) -> io::Result<Self> {
        Ok(LoopHandle {
            shared: Arc::new(LoopShared {
                pending: PendingQueue::default(),
                wakeup: WakeupChannel::new(registry, WAKEUP_TOKEN)?,
                running: AtomicBool::new(false),
            }),
        })
    }

    /// Queues `callback` for the reactor thread without waking it.
    pub fn set_pending_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.pending.push(Box::new(callback))
    }

    /// Forces the reactor out of its poll so it drains the pending queue.
    pub fn wakeup(&self) -> Result<()> {
        Ok(self.shared.wakeup.notify()?)
    }

    /// Queues `callback`, then wakes the reactor. The order is fixed: a
    /// wakeup observed by the reactor always finds the callback queued.
    pub fn run_in_loop<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.set_pending_callback(callback)?;
        self.wakeup()
    }

    /// Asks the loop to stop. `run` returns after the poll in progress;
    /// sockets and queued callbacks are left untouched so the loop can be
    /// restarted.
    pub fn unloop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let _ = self.shared.wakeup.notify();
    }

    pub fn is_looping(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn pending_len(&self) -> Result<usize> {
        self.shared.pending.len()
    }

    /// Drops every queued callback without running it and returns how many
    /// were dropped.
    pub fn discard_pending(&self) -> Result<usize> {
        self.shared.wakeup.consume();
        Ok(self.shared.pending.take()?.len())
    }

    fn take_pending(&self) -> Result<(u64, Vec<PendingCallback>)> {
        // consume the signal first: a notify racing with the drain then
        // re-arms the waker instead of being absorbed
        let signals = self.shared.wakeup.consume();
        Ok((signals, self.shared.pending.take()?))
    }
}

/// The reactor.
///
/// A single thread runs [`run`](Self::run), which multiplexes the listening
/// socket, every live connection and the wakeup channel. Only that thread
/// accepts, reads, writes or closes sockets, and only it touches the
/// connection table.
///
/// ```text
///   listener ready ──> accept ──> register ──> table.insert ──> on_connect
///   wakeup ready   ──> consume counter ──> swap pending queue ──> run each
///   conn ready     ──> liveness peek ─┬─ closed   ──> on_close ──> deregister ──> table.remove
///                                     └─ readable ──> on_message
/// ```
pub struct EventLoop {
    poll_handle: PollHandle,
    acceptor: Acceptor,
    connections: HashMap<Token, Arc<TcpConnection>>,
    callbacks: Callbacks,
    handle: LoopHandle,
    options: ConnectionOptions,
    poll_timeout: Duration,
    messages_per_event: usize,
    next_id: u64,
    ready: Vec<Token>,
}

impl EventLoop {
    pub fn new(acceptor: Acceptor, config: &TcpServerConfig) -> Result<Self> {
        config.validate()?;
        let poll_handle = PollHandle::new(config.events_capacity)?;
        let handle = LoopHandle::new(poll_handle.registry())?;
        poll_handle.register_fd(acceptor.as_raw_fd(), LISTENER_TOKEN)?;

        Ok(EventLoop {
            poll_handle,
            acceptor,
            connections: HashMap::new(),
            callbacks: Callbacks::default(),
            handle,
            options: ConnectionOptions::from(config),
            poll_timeout: config.poll_timeout,
            messages_per_event: config.messages_per_event,
            next_id: FIRST_CONNECTION_ID,
            ready: Vec::with_capacity(config.events_capacity),
        })
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn set_callbacks(&mut self, callbacks: Callbacks) {
        self.callbacks = callbacks;
    }

    pub fn callbacks_mut(&mut self) -> &mut Callbacks {
        &mut self.callbacks
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Same as [`LoopHandle::unloop`].
    pub fn stop(&self) {
        self.handle.unloop();
    }

    pub fn acceptor(&self) -> &Acceptor {
        &self.acceptor
    }

    /// Runs the reactor until [`LoopHandle::unloop`] is called.
    ///
    /// A poll that times out without events is logged and the loop goes on.
    /// Only a failing multiplexer ends the loop with an error.
    pub fn run(&mut self) -> Result<()> {
        self.handle.shared.running.store(true, Ordering::SeqCst);
        self.log(LogLevel::Info, "event loop started");

        while self.handle.is_looping() {
            let ready = match self.poll_handle.poll(Some(self.poll_timeout)) {
                Ok(ready) => ready,
                Err(e) => {
                    self.handle.shared.running.store(false, Ordering::SeqCst);
                    self.log(LogLevel::Error, &format!("poll failed: {e}"));
                    return Err(e.into());
                }
            };

            if ready == 0 {
                self.log(
                    LogLevel::Debug,
                    &format!("poll timed out after {:?}", self.poll_timeout),
                );
                continue;
            }

            let mut tokens = std::mem::take(&mut self.ready);
            tokens.clear();
            tokens.extend(self.poll_handle.events().iter().map(|event| event.token()));
            for &token in &tokens {
                self.dispatch(token);
            }
            self.ready = tokens;
        }

        self.log(LogLevel::Info, "event loop stopped");
        Ok(())
    }

    fn dispatch(&mut self, token: Token) {
        match token {
            LISTENER_TOKEN => self.accept_connections(),
            WAKEUP_TOKEN => self.run_pending(),
            token => self.handle_connection(token),
        }
    }

    fn accept_connections(&mut self) {
        // edge-triggered: the listener has to be drained
        loop {
            match self.acceptor.accept() {
                Ok(stream) => {
                    if let Err(e) = self.admit(stream) {
                        self.log(
                            LogLevel::Error,
                            &format!("failed to admit connection: {e}"),
                        );
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.log(LogLevel::Error, &format!("accept error: {e}"));
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream) -> Result<()> {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        let token = id.token();

        let conn = Arc::new(TcpConnection::new(
            id,
            stream,
            self.callbacks.clone(),
            self.handle.clone(),
            self.options.clone(),
        )?);
        self.poll_handle.register_fd(conn.as_raw_fd(), token)?;
        self.connections.insert(token, Arc::clone(&conn));

        self.log(
            LogLevel::Info,
            &format!("{} connected (id: {})", conn.show(), id.as_u64()),
        );
        conn.handle_connect();
        Ok(())
    }

    fn run_pending(&mut self) {
        let (signals, callbacks) = match self.handle.take_pending() {
            Ok(drained) => drained,
            Err(e) => {
                self.log(
                    LogLevel::Error,
                    &format!("failed to drain pending callbacks: {e}"),
                );
                return;
            }
        };

        self.log(
            LogLevel::Debug,
            &format!(
                "running {} pending callbacks after {} wakeups",
                callbacks.len(),
                signals
            ),
        );
        for callback in callbacks {
            callback();
        }
    }

    fn handle_connection(&mut self, token: Token) {
        let conn = match self.connections.get(&token) {
            Some(conn) => Arc::clone(conn),
            None => {
                self.log(
                    LogLevel::Warn,
                    &format!("readiness event for unknown token {}", token.0),
                );
                return;
            }
        };

        let mut dispatched = 0;
        loop {
            match conn.liveness() {
                Liveness::Closed => {
                    self.close_connection(token, &conn);
                    return;
                }
                Liveness::Idle => return,
                Liveness::Readable if dispatched == self.messages_per_event => {
                    // leave the rest for a fresh event so other sources get a turn
                    if let Err(e) = self.poll_handle.reregister_fd(conn.as_raw_fd(), token) {
                        self.log(
                            LogLevel::Error,
                            &format!("{}: failed to re-arm: {e}", conn.show()),
                        );
                    }
                    return;
                }
                Liveness::Readable => {
                    conn.handle_message();
                    dispatched += 1;
                }
            }
        }
    }

    fn close_connection(&mut self, token: Token, conn: &Arc<TcpConnection>) {
        conn.mark_disconnected();
        conn.handle_close();

        if let Err(e) = self.poll_handle.deregister_fd(conn.as_raw_fd()) {
            self.log(
                LogLevel::Warn,
                &format!("{}: failed to deregister: {e}", conn.show()),
            );
        }
        self.connections.remove(&token);
        self.log(LogLevel::Info, &format!("{} disconnected", conn.show()));
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.options.logger.log(level, message);
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // queued sends hold their connection; release them with the loop
        match self.handle.discard_pending() {
            Ok(0) => {}
            Ok(dropped) => self.log(
                LogLevel::Warn,
                &format!("dropped {dropped} pending callbacks on shutdown"),
            ),
            Err(e) => self.log(
                LogLevel::Error,
                &format!("failed to discard pending callbacks: {e}"),
            ),
        }
    }
}
