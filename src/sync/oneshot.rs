//! A single-value, single-waiter handoff channel.
//!
//! This is the building block every producer thread in this crate (pool
//! worker, timer thread, signal capture thread, net thread) uses to deliver
//! its result back to a waiting [`crate::task::Task`]. It mirrors the shape
//! of a classic oneshot channel but stores its state behind a plain `Mutex`
//! rather than a lock-free cell, since every consumer here lives on the
//! single loop thread and there is no multi-core contention to optimize for.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct RecvError;

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sender dropped without sending a value")
    }
}

impl std::error::Error for RecvError {}

struct Inner<T> {
    value: Option<T>,
    waker: Option<Waker>,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<Inner<T>>,
}

/// The writer half. Consumed by [`Sender::send`].
pub struct Sender<T> {
    inner: Arc<Shared<T>>,
}

/// The reader half. Implements [`Future`] directly so it can be `.await`ed.
pub struct Receiver<T> {
    inner: Arc<Shared<T>>,
}

pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(Inner {
            value: None,
            waker: None,
            closed: false,
        }),
    });
    (
        Sender {
            inner: shared.clone(),
        },
        Receiver { inner: shared },
    )
}

impl<T> Sender<T> {
    /// Deliver `value` to the receiver and wake it if it is waiting.
    ///
    /// Returns `Err(value)` if the receiver has already been dropped.
    pub fn send(self, value: T) -> Result<(), T> {
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return Err(value);
        }
        state.value = Some(value);
        let waker = state.waker.take();
        drop(state);
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.value.is_none() {
            state.closed = true;
            if let Some(waker) = state.waker.take() {
                drop(state);
                waker.wake();
            }
        }
    }
}

impl<T> Future for Receiver<T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(value) = state.value.take() {
            return Poll::Ready(Ok(value));
        }
        if state.closed {
            return Poll::Ready(Err(RecvError));
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::Wake;

    struct NoopWake;
    impl Wake for NoopWake {
        fn wake(self: Arc<Self>) {}
    }

    fn noop_cx() -> Waker {
        Waker::from(Arc::new(NoopWake))
    }

    #[test]
    fn send_then_recv() {
        let (tx, mut rx) = channel::<i32>();
        tx.send(7).unwrap();

        let waker = noop_cx();
        let mut cx = Context::from_waker(&waker);
        match Pin::new(&mut rx).poll(&mut cx) {
            Poll::Ready(Ok(v)) => assert_eq!(v, 7),
            other => panic!("expected Ready(Ok(7)), got {other:?}"),
        }
    }

    #[test]
    fn dropped_sender_closes_receiver() {
        let (tx, mut rx) = channel::<i32>();
        drop(tx);

        let waker = noop_cx();
        let mut cx = Context::from_waker(&waker);
        match Pin::new(&mut rx).poll(&mut cx) {
            Poll::Ready(Err(RecvError)) => {}
            other => panic!("expected Ready(Err(RecvError)), got {other:?}"),
        }
    }
}
