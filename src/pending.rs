//! Cross-thread hand-back into the reactor.
//!
//! Worker threads never touch sockets. They append a [`PendingCallback`] to the
//! shared queue and then signal the [`WakeupChannel`]; the reactor consumes the
//! signal, swaps the whole queue out and runs the callbacks in order. The
//! append must happen before the signal, otherwise the reactor can observe the
//! wakeup, drain an empty queue and leave the callback stranded until some
//! unrelated event arrives.

use std::{
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use mio::{Registry, Token, Waker};

use crate::error::Result;

/// A deferred action executed on the reactor thread.
pub type PendingCallback = Box<dyn FnOnce() + Send + 'static>;

/// Ordered queue of pending callbacks.
///
/// The lock is held only to append or to swap the vector out, never while a
/// callback runs.
#[derive(Default)]
pub struct PendingQueue {
    callbacks: Mutex<Vec<PendingCallback>>,
}

impl PendingQueue {
    pub fn push(&self, callback: PendingCallback) -> Result<()> {
        self.callbacks.lock()?.push(callback);
        Ok(())
    }

    pub fn take(&self) -> Result<Vec<PendingCallback>> {
        Ok(std::mem::take(&mut *self.callbacks.lock()?))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.callbacks.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Level counter backed by a `mio::Waker`.
///
/// Signals coalesce: only the transition from zero fires the waker, and the
/// reactor resets the counter with [`consume`](Self::consume) before it drains
/// the queue. A signal raised after the reset therefore fires a fresh wakeup.
pub struct WakeupChannel {
    counter: AtomicU64,
    waker: Waker,
}

impl WakeupChannel {
    pub fn new(registry: &Registry, token: Token) -> io::Result<Self> {
        Ok(WakeupChannel {
            counter: AtomicU64::new(0),
            waker: Waker::new(registry, token)?,
        })
    }

    pub fn notify(&self) -> io::Result<()> {
        if self.counter.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Err(e) = self.waker.wake() {
                // let the next notifier retry the wake
                self.counter.store(0, Ordering::SeqCst);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Returns the number of signals since the last call and resets it.
    pub fn consume(&self) -> u64 {
        self.counter.swap(0, Ordering::SeqCst)
    }

    pub fn is_signalled(&self) -> bool {
        self.counter.load(Ordering::SeqCst) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    #[test]
    fn test_queue_preserves_order_and_clears() {
        let queue = PendingQueue::default();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for i in 0..5 {
            let seen = seen.clone();
            queue.push(Box::new(move || seen.lock().unwrap().push(i))).unwrap();
        }
        assert_eq!(queue.len().unwrap(), 5);

        for callback in queue.take().unwrap() {
            callback();
        }
        assert!(queue.is_empty().unwrap());
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_poisoned_queue_is_reported() {
        let queue = Arc::new(PendingQueue::default());
        let poisoner = queue.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.callbacks.lock().unwrap();
            panic!("poison the queue lock");
        })
        .join();

        assert!(matches!(
            queue.len(),
            Err(crate::error::NetworkError::PoisonedLock(_))
        ));
        assert!(queue.is_empty().is_err());
        assert!(queue.push(Box::new(|| {})).is_err());
    }

    #[test]
    fn test_wakeup_coalesces_signals() {
        let mut poll = Poll::new().unwrap();
        let channel = WakeupChannel::new(poll.registry(), Token(7)).unwrap();
        let mut events = Events::with_capacity(4);

        channel.notify().unwrap();
        channel.notify().unwrap();
        channel.notify().unwrap();
        assert!(channel.is_signalled());

        poll.poll(&mut events, Some(Duration::from_millis(500))).unwrap();
        let wakeups = events.iter().filter(|e| e.token() == Token(7)).count();
        assert_eq!(wakeups, 1);
        assert_eq!(channel.consume(), 3);
        assert!(!channel.is_signalled());
    }

    #[test]
    fn test_notify_after_consume_wakes_again() {
        let mut poll = Poll::new().unwrap();
        let channel = WakeupChannel::new(poll.registry(), Token(3)).unwrap();
        let mut events = Events::with_capacity(4);

        channel.notify().unwrap();
        poll.poll(&mut events, Some(Duration::from_millis(500))).unwrap();
        assert_eq!(channel.consume(), 1);

        channel.notify().unwrap();
        poll.poll(&mut events, Some(Duration::from_millis(500))).unwrap();
        assert!(events.iter().any(|e| e.token() == Token(3)));
        assert_eq!(channel.consume(), 1);
    }
}
