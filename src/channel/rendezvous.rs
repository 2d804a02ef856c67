//! Rendezvous channel used for every suspension point.
//!
//! A reader that needs data hands a [`Sender`] to the scheduler and awaits the
//! matching [`Receiver`]. The scheduler posts exactly one message per
//! registration; each call to [`Receiver::recv`] consumes exactly one value.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     RENDEZVOUS DELIVERY                      │
//! │                                                              │
//! │   Scheduler (Sender)                    Stream (Receiver)    │
//! │        │                                       │             │
//! │        │                                       ├── recv() …  │
//! │        │─── send(Notification) ───────────────►├── Ok(msg)   │
//! │        │                                       │             │
//! │   (all senders dropped, queue empty) ─────────►├── Err(Closed)│
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Senders are cloneable so that several registrations (for example a
//! readiness race plus a timer in `select`) can share a single reply channel.
//! The first message wins; later ones are simply never received.
//!
//! # Example
//!
//! ```ignore
//! use fdstream::channel::rendezvous;
//!
//! let (tx, rx) = rendezvous::channel::<u32>();
//! tx.send(7)?;
//! let value = rx.recv().await?;
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use thiserror::Error;

/// Error returned when sending fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError<T> {
    /// The receiver was dropped before the value could be posted.
    #[error("sending on a closed rendezvous channel")]
    Disconnected(T),
}

impl<T> SendError<T> {
    /// Returns the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            Self::Disconnected(value) => value,
        }
    }
}

/// Error returned when receiving fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    /// Every sender was dropped and no value is queued.
    #[error("receiving on a closed rendezvous channel")]
    Closed,
}

/// Error returned when `try_recv` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
    /// No value available yet, but a sender still exists.
    #[error("rendezvous channel is empty")]
    Empty,
    /// Every sender was dropped and no value is queued.
    #[error("rendezvous channel is closed")]
    Closed,
}

impl From<RecvError> for crate::error::Error {
    fn from(e: RecvError) -> Self {
        Self::internal("scheduler dropped a registration without replying").with_source(e)
    }
}

#[derive(Debug)]
struct Inner<T> {
    queue: VecDeque<T>,
    waker: Option<Waker>,
    senders: usize,
    receiver_alive: bool,
}

impl<T> Inner<T> {
    fn is_closed(&self) -> bool {
        self.senders == 0 && self.queue.is_empty()
    }
}

/// Creates a new rendezvous channel, returning the sender and receiver halves.
#[must_use]
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(Mutex::new(Inner {
        queue: VecDeque::new(),
        waker: None,
        senders: 1,
        receiver_alive: true,
    }));
    (
        Sender {
            inner: Arc::clone(&inner),
        },
        Receiver { inner },
    )
}

/// The posting half of a rendezvous channel.
#[derive(Debug)]
pub struct Sender<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Sender<T> {
    /// Posts a value and wakes the waiting receiver.
    ///
    /// # Errors
    ///
    /// Returns `SendError::Disconnected` if the receiver is gone.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        let waker = {
            let mut inner = self.inner.lock();
            if !inner.receiver_alive {
                return Err(SendError::Disconnected(value));
            }
            inner.queue.push_back(value);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// Returns true once the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.inner.lock().receiver_alive
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.inner.lock().senders += 1;
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let waker = {
            let mut inner = self.inner.lock();
            inner.senders -= 1;
            if inner.senders == 0 {
                inner.waker.take()
            } else {
                None
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// The receiving half of a rendezvous channel.
#[derive(Debug)]
pub struct Receiver<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Receiver<T> {
    /// Waits for the next posted value.
    ///
    /// The returned future resolves with `Err(RecvError::Closed)` once every
    /// sender is gone and nothing is queued.
    pub fn recv(&self) -> Recv<'_, T> {
        Recv { receiver: self }
    }

    /// Attempts to receive a value without suspending.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.queue.pop_front() {
            return Ok(value);
        }
        if inner.is_closed() {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Returns true if every sender is gone and nothing is queued.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_closed()
    }

    fn poll_recv(&self, cx: &mut Context<'_>) -> Poll<Result<T, RecvError>> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.queue.pop_front() {
            return Poll::Ready(Ok(value));
        }
        if inner.is_closed() {
            return Poll::Ready(Err(RecvError::Closed));
        }
        match &inner.waker {
            Some(existing) if existing.will_wake(cx.waker()) => {}
            _ => inner.waker = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.receiver_alive = false;
        inner.queue.clear();
        inner.waker = None;
    }
}

/// Future returned by [`Receiver::recv`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Recv<'a, T> {
    receiver: &'a Receiver<T>,
}

impl<T> Future for Recv<'_, T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn send_then_recv() {
        init_test("send_then_recv");
        let (tx, rx) = channel::<u32>();
        tx.send(42).expect("send");
        let value = future::block_on(rx.recv());
        crate::assert_with_log!(value == Ok(42), "received", Ok::<u32, RecvError>(42), value);
        crate::test_complete!("send_then_recv");
    }

    #[test]
    fn one_value_per_recv() {
        init_test("one_value_per_recv");
        let (tx, rx) = channel::<u32>();
        tx.send(1).expect("send");
        tx.send(2).expect("send");
        assert_eq!(rx.try_recv(), Ok(1));
        assert_eq!(rx.try_recv(), Ok(2));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        crate::test_complete!("one_value_per_recv");
    }

    #[test]
    fn recv_pending_until_posted() {
        init_test("recv_pending_until_posted");
        let (tx, rx) = channel::<&'static str>();
        let mut fut = Box::pin(rx.recv());
        let pending = future::block_on(future::poll_once(&mut fut));
        crate::assert_with_log!(pending.is_none(), "pending", true, pending.is_none());
        tx.send("ready").expect("send");
        let ready = future::block_on(fut);
        assert_eq!(ready, Ok("ready"));
        crate::test_complete!("recv_pending_until_posted");
    }

    #[test]
    fn dropping_all_senders_closes() {
        init_test("dropping_all_senders_closes");
        let (tx, rx) = channel::<u8>();
        let tx2 = tx.clone();
        drop(tx);
        assert!(!rx.is_closed());
        drop(tx2);
        assert!(rx.is_closed());
        assert_eq!(future::block_on(rx.recv()), Err(RecvError::Closed));
        crate::test_complete!("dropping_all_senders_closes");
    }

    #[test]
    fn queued_value_survives_sender_drop() {
        init_test("queued_value_survives_sender_drop");
        let (tx, rx) = channel::<u8>();
        tx.send(9).expect("send");
        drop(tx);
        assert_eq!(rx.try_recv(), Ok(9));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
        crate::test_complete!("queued_value_survives_sender_drop");
    }

    #[test]
    fn send_after_receiver_drop_fails() {
        init_test("send_after_receiver_drop_fails");
        let (tx, rx) = channel::<u8>();
        drop(rx);
        assert!(tx.is_closed());
        let err = tx.send(5).expect_err("receiver gone");
        assert_eq!(err.into_inner(), 5);
        crate::test_complete!("send_after_receiver_drop_fails");
    }
}
