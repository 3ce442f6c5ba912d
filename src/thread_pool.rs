use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc as channel,
    },
    thread::{Builder, JoinHandle},
};

use crate::error::{NetworkError, Result};

pub const DEFAULT_POOL_CAPACITY: usize = 4;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Where message-processing tasks run. The reactor only ever schedules
/// closures; it never looks inside the pool.
pub trait WorkerPool: Send + Sync + 'static {
    fn submit(&self, task: Task) -> Result<()>;
}

enum WorkerMessage {
    Task(Task),
    Terminate,
}

/// Fixed-size pool with one channel per worker and round-robin dispatch.
///
/// Dropping the pool lets every worker finish the tasks already queued to it
/// before joining.
pub struct ThreadPool {
    workers: Vec<Worker>,
    senders: Vec<channel::Sender<WorkerMessage>>,
    next_worker: AtomicUsize,
}

impl ThreadPool {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(NetworkError::Configuration(
                "thread pool needs at least one worker".into(),
            ));
        }

        let mut workers = Vec::with_capacity(capacity);
        let mut senders = Vec::with_capacity(capacity);

        for id in 0..capacity {
            let (sender, receiver) = channel::channel::<WorkerMessage>();
            workers.push(Worker::new(id, receiver)?);
            senders.push(sender);
        }

        Ok(Self {
            workers,
            senders,
            next_worker: AtomicUsize::new(0),
        })
    }

    /// One worker per available core.
    pub fn with_available_parallelism() -> Result<Self> {
        let capacity = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(DEFAULT_POOL_CAPACITY);
        Self::new(capacity)
    }

    pub fn exec<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        // Round-robin dispatch
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        self.senders[index]
            .send(WorkerMessage::Task(Box::new(task)))
            .map_err(|_| NetworkError::PoolClosed)
    }

    pub fn workers_len(&self) -> usize {
        self.workers.len()
    }
}

impl WorkerPool for ThreadPool {
    fn submit(&self, task: Task) -> Result<()> {
        self.exec(task)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for sender in &self.senders {
            let _ = sender.send(WorkerMessage::Terminate);
        }
        for worker in &mut self.workers {
            if let Some(t) = worker.take_thread() {
                let _ = t.join();
            }
        }
    }
}

struct Worker {
    #[allow(dead_code)]
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: channel::Receiver<WorkerMessage>) -> Result<Self> {
        let thread = Builder::new()
            .name(format!("mill-frame-worker-{id}"))
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    match message {
                        WorkerMessage::Task(task) => task(),
                        WorkerMessage::Terminate => break,
                    }
                }
            })?;

        Ok(Self {
            id,
            thread: Some(thread),
        })
    }

    fn take_thread(&mut self) -> Option<JoinHandle<()>> {
        self.thread.take()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        sync::Arc,
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_thread_pool_creation() {
        let pool = ThreadPool::new(4).unwrap();
        assert_eq!(pool.workers_len(), 4);
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        assert!(matches!(
            ThreadPool::new(0),
            Err(NetworkError::Configuration(_))
        ));
    }

    #[test]
    fn test_task_execution() {
        let pool = ThreadPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        pool.exec(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_submit_through_trait_object() {
        let pool: Arc<dyn WorkerPool> = Arc::new(ThreadPool::new(3).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter_clone = counter.clone();
            pool.submit(Box::new(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_pool_cleanup() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::new(2).unwrap();
            let counter_clone = counter.clone();

            pool.exec(move || {
                std::thread::sleep(Duration::from_millis(50));
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
