//! Counting wakeup semaphore.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::time::Duration;

/// Counting semaphore backed by a pre-allocated bounded channel of tokens.
///
/// [`signal`](Semaphore::signal) is a non-blocking `try_send`, safe on the audio thread.
/// The count saturates at the channel depth: once that many wakeups are pending, extra
/// signals are dropped, which is harmless for a drain-everything consumer.
#[derive(Debug, Clone)]
pub struct Semaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Semaphore {
    pub fn new(depth: usize) -> Self {
        let (tx, rx) = bounded(depth.max(1));
        Self { tx, rx }
    }

    /// Post one token. Returns false if the count was already saturated.
    #[inline]
    pub fn signal(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }

    /// Block until a token is available and take it.
    pub fn wait(&self) {
        // Both ends live in `self`, so the channel cannot disconnect.
        let _ = self.rx.recv();
    }

    /// Returns false on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }

    /// Take a token if one is pending.
    pub fn try_wait(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Number of pending tokens.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_signal_saturates_at_depth() {
        let sem = Semaphore::new(2);
        assert!(sem.signal());
        assert!(sem.signal());
        assert!(!sem.signal());
        assert_eq!(sem.pending(), 2);

        assert!(sem.try_wait());
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
    }

    #[test]
    fn test_wait_timeout_without_signal() {
        let sem = Semaphore::new(4);
        assert!(!sem.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_wakes_waiting_thread() {
        let sem = Semaphore::new(4);
        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || sem.wait())
        };
        sem.signal();
        waiter.join().unwrap();
        assert_eq!(sem.pending(), 0);
    }
}
