//! Coalescing "something changed" signals
//!
//! A single-slot channel: any number of [`CoalesceSender::request`] calls made
//! before the consumer wakes collapse into one pending signal, and a request
//! made while the consumer is busy is kept for its next wait.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Clone, Debug)]
pub struct CoalesceSender {
    tx: mpsc::Sender<()>,
}

impl CoalesceSender {
    /// Ask for one more action. Never blocks.
    pub fn request(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                tracing::trace!("coalesce consumer gone, dropping request");
            }
        }
    }
}

#[derive(Debug)]
pub struct CoalesceReceiver {
    rx: mpsc::Receiver<()>,
}

impl CoalesceReceiver {
    /// Wait for at least one request, discarding any others already queued.
    /// Returns `false` once every sender is gone.
    pub async fn wait(&mut self) -> bool {
        if self.rx.recv().await.is_none() {
            return false;
        }
        while self.rx.try_recv().is_ok() {}
        true
    }

    /// Non-blocking variant of [`wait`](Self::wait)
    #[cfg(any(test, feature = "test-util"))]
    pub fn try_wait(&mut self) -> bool {
        if self.rx.try_recv().is_err() {
            return false;
        }
        while self.rx.try_recv().is_ok() {}
        true
    }
}

pub fn coalescer() -> (CoalesceSender, CoalesceReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (CoalesceSender { tx }, CoalesceReceiver { rx })
}
