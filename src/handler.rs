use std::sync::Arc;

use crate::net::tcp::connection::TcpConnection;

/// Lifecycle callback invoked on the reactor thread.
pub type ConnectionCallback = Arc<dyn Fn(&Arc<TcpConnection>) + Send + Sync + 'static>;

/// The three callbacks every connection is bound to when it is accepted.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_connect: Option<ConnectionCallback>,
    pub on_message: Option<ConnectionCallback>,
    pub on_close: Option<ConnectionCallback>,
}

impl Callbacks {
    pub fn from_handler<H: ConnectionHandler>(handler: Arc<H>) -> Self {
        let on_connect = handler.clone();
        let on_message = handler.clone();
        let on_close = handler;
        Callbacks {
            on_connect: Some(Arc::new(move |conn: &Arc<TcpConnection>| {
                on_connect.on_connect(conn)
            })),
            on_message: Some(Arc::new(move |conn: &Arc<TcpConnection>| {
                on_message.on_message(conn)
            })),
            on_close: Some(Arc::new(move |conn: &Arc<TcpConnection>| {
                on_close.on_close(conn)
            })),
        }
    }
}

/// Handler for connection lifecycle events.
///
/// All methods run on the reactor thread, one connection at a time, so they
/// must return quickly. Expensive work belongs on a worker pool; the result
/// comes back through [`TcpConnection::notify_loop`].
///
/// `on_message` runs while the connection has unread data and must consume
/// it (usually one [`TcpConnection::recv`]). A handler that leaves the data
/// queued is invoked again for the same bytes.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Called once, right after the connection is admitted
    fn on_connect(&self, conn: &Arc<TcpConnection>) {
        let _ = conn;
    }

    /// Called when the connection has readable data
    fn on_message(&self, conn: &Arc<TcpConnection>);

    /// Called once, when the peer is found disconnected
    fn on_close(&self, conn: &Arc<TcpConnection>) {
        let _ = conn;
    }
}
