use std::sync::Arc;

use crate::error::NetworkError;
use crate::handler::ConnectionCallback;
use crate::net::tcp::connection::TcpConnection;
use crate::net::tcp::traits::{LogLevel, Logger};
use crate::thread_pool::WorkerPool;

/// Business logic behind the server: one request payload in, one response
/// payload out. Runs on a worker thread.
///
/// Decoding the request, consulting caches or stores and encoding the
/// response all happen here; the reactor only moves bytes.
pub trait Service: Send + Sync + 'static {
    fn call(&self, request: Vec<u8>) -> Vec<u8>;
}

impl<F> Service for F
where
    F: Fn(Vec<u8>) -> Vec<u8> + Send + Sync + 'static,
{
    fn call(&self, request: Vec<u8>) -> Vec<u8> {
        self(request)
    }
}

/// Builds the message callback that reads one frame on the reactor, runs
/// `service` on `pool` and sends the response back through the loop.
///
/// A frame that cannot be read because of a protocol violation or an I/O
/// error leaves the stream unusable, so the connection is shut down and the
/// reactor closes it on the next liveness check.
pub(crate) fn frame_dispatcher<S, P>(
    service: Arc<S>,
    pool: Arc<P>,
    logger: Arc<dyn Logger>,
) -> ConnectionCallback
where
    S: Service + ?Sized,
    P: WorkerPool + ?Sized,
{
    Arc::new(move |conn: &Arc<TcpConnection>| {
        let request = match conn.recv() {
            Ok(request) => request,
            Err(NetworkError::PeerClosed { received, expected }) => {
                logger.log(
                    LogLevel::Debug,
                    &format!(
                        "{}: peer closed mid-frame ({received}/{expected} bytes)",
                        conn.show()
                    ),
                );
                return;
            }
            Err(e) => {
                logger.log(
                    LogLevel::Warn,
                    &format!("{}: dropping connection: {e}", conn.show()),
                );
                if let Err(e) = conn.shutdown() {
                    logger.log(
                        LogLevel::Error,
                        &format!("{}: shutdown failed: {e}", conn.show()),
                    );
                }
                return;
            }
        };

        let service = Arc::clone(&service);
        let task_conn = Arc::clone(conn);
        let task_logger = Arc::clone(&logger);
        let submitted = pool.submit(Box::new(move || {
            let response = service.call(request);
            if let Err(e) = task_conn.notify_loop(response) {
                task_logger.log(
                    LogLevel::Error,
                    &format!("{}: failed to hand response back: {e}", task_conn.show()),
                );
            }
        }));

        if let Err(e) = submitted {
            logger.log(
                LogLevel::Error,
                &format!("{}: failed to submit request: {e}", conn.show()),
            );
        }
    })
}
