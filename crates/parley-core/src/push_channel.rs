//! Single-consumer push channel
//!
//! Bridges a producer that pushes values at arbitrary times and a single
//! consumer that pulls them one at a time in FIFO order.
//!
//! ## Semantics
//!
//! - `push` enqueues a value, waking the consumer if it is suspended
//! - `close` marks the channel terminal; queued values are still drained,
//!   then the consumer observes end-of-sequence
//! - pushes after `close` are silently dropped
//! - dropping the last [`PushSender`] closes the channel
//! - dropping the [`PushReceiver`] turns further pushes into no-ops and
//!   resolves [`PushSender::closed`]
//!
//! Buffering is unbounded; backpressure is not enforced at this layer.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Create a new push channel, returning the producer and consumer halves
pub fn push_channel<T>() -> (PushSender<T>, PushReceiver<T>) {
    let (tx, rx) = unbounded_channel();
    (
        PushSender {
            inner: Arc::new(Mutex::new(Some(tx))),
        },
        PushReceiver { rx },
    )
}

/// Producer half of a push channel. Cheap to clone.
///
/// Clones share one underlying sender, so `close` on any clone closes the
/// channel for all of them.
pub struct PushSender<T> {
    inner: Arc<Mutex<Option<UnboundedSender<T>>>>,
}

impl<T> PushSender<T> {
    /// Enqueue a value for the consumer.
    ///
    /// Returns `false` if the value was dropped because the channel is closed
    /// or the receiver is gone.
    pub fn push(&self, value: T) -> bool {
        match self.inner.lock().as_ref() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Mark the channel terminal. Queued values are still delivered.
    pub fn close(&self) {
        self.inner.lock().take();
    }

    /// Whether pushes are currently being dropped
    pub fn is_closed(&self) -> bool {
        self.inner.lock().as_ref().is_none_or(|tx| tx.is_closed())
    }

    /// Wait until the receiver has been dropped.
    ///
    /// Resolves immediately if this side already closed the channel. While
    /// pending it holds a sender handle, so the consumer does not see
    /// end-of-sequence until the future is dropped.
    pub async fn closed(&self) {
        let tx = self.inner.lock().clone();
        if let Some(tx) = tx {
            tx.closed().await;
        }
    }
}

impl<T> Clone for PushSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Consumer half of a push channel.
///
/// Pulling takes `&mut self`, so only one pull can be in flight at a time.
pub struct PushReceiver<T> {
    rx: UnboundedReceiver<T>,
}

impl<T> PushReceiver<T> {
    /// Pull the next value, suspending while the channel is empty and open.
    ///
    /// Returns `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Poll for the next value
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }

    /// Number of values currently buffered
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no values are currently buffered
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Stream for PushReceiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
