//! Bounded stage queues with a receiver shared by a worker pool.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

/// Opens a bounded queue whose receiving side can be cloned across workers.
pub fn bounded<T>(capacity: usize) -> (mpsc::Sender<T>, SharedReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, SharedReceiver::new(rx))
}

/// Receiver handed to every worker of a pool; each item goes to exactly one
/// worker.
#[derive(Debug)]
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedReceiver<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next item, or `None` once every sender is gone and the queue is empty.
    ///
    /// Cancel safe: dropping the future releases the lock without losing an
    /// item.
    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }

    /// Closes the queue and discards whatever is still buffered.
    ///
    /// Returns the number of discarded items.
    pub async fn close_and_drain(&self) -> usize {
        let mut rx = self.inner.lock().await;
        rx.close();
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}
