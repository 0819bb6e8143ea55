//! The lazy task / continuation protocol.
//!
//! A [`Task<T>`] owns a boxed, suspended coroutine frame. Nothing runs until
//! the task is either `.await`ed by another future (*attached* use) or
//! handed to [`Task::start`] (*detached* use). Attached use is simply nested
//! `Future::poll` -- there is no extra scheduler hop purely from awaiting one
//! task inside another. Detached use drives the frame to completion with a
//! [`std::task::Wake`]-backed reposting loop: every time the frame wakes
//! itself, a job that re-polls it is posted back onto the owning
//! [`crate::scheduler::Scheduler`], so every resumption happens on the loop
//! thread.

mod detach;
mod spawned;

pub use detach::spawn_detached;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use crate::context::Runtime;
use crate::error::Error;
use spawned::Spawned;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// An opaque, cloneable identity for a [`Task`], stable for its whole
/// lifetime. Used for tracing correlation; carries no capability to resume
/// or inspect the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send>>;

/// A lazy, suspended coroutine frame producing `T` or an [`Error`].
///
/// `T` is bound by `Send + 'static`: reference result types are rejected at
/// the type level, per the task protocol's invariants.
#[must_use = "tasks do nothing unless `.await`ed or `.start()`ed"]
pub struct Task<T> {
    id: TaskId,
    inner: Option<BoxFuture<T>>,
}

impl<T: Send + 'static> Task<T> {
    /// Wrap `future` as a task. Constructing a task runs no user code.
    #[track_caller]
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        Self {
            id: TaskId::next(),
            inner: Some(Box::pin(future)),
        }
    }

    /// An opaque identity for this task, for diagnostics only.
    #[must_use]
    pub fn handle(&self) -> TaskId {
        self.id
    }

    /// `false` once [`Task::start`] has released the frame.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.inner.is_some()
    }

    /// Release this task's frame onto `rt`'s scheduler.
    ///
    /// The task is marked detached and an initial poll job is posted to
    /// `rt`; this `Task` value becomes empty (subsequent `.await` or
    /// `.start()` calls panic). Any failure produced by the frame is routed
    /// to the tracing diagnostic sink and then discarded: detaching means
    /// there is no longer a consumer that could observe it.
    pub fn start(mut self, rt: &Runtime) {
        let fut = self
            .inner
            .take()
            .expect("Task::start called on an already-started or already-awaited task");
        tracing::trace!(task.id = ?self.id, "starting detached task");
        Spawned::spawn(rt.scheduler().clone(), self.id, fut);
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self
            .inner
            .as_mut()
            .expect("Task polled after Task::start() released its frame");
        inner.as_mut().poll(cx)
    }
}
