//! The detached-task driving loop: a [`std::task::Wake`] implementation that
//! reposts a re-poll job onto the owning scheduler every time the frame
//! wakes itself.

use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use super::{BoxFuture, TaskId};
use crate::scheduler::Scheduler;

pub(super) struct Spawned<T> {
    scheduler: Scheduler,
    id: TaskId,
    fut: Mutex<Option<BoxFuture<T>>>,
}

impl<T: Send + 'static> Spawned<T> {
    pub(super) fn spawn(scheduler: Scheduler, id: TaskId, fut: BoxFuture<T>) {
        let spawned = Arc::new(Spawned {
            scheduler: scheduler.clone(),
            id,
            fut: Mutex::new(Some(fut)),
        });
        // The first poll is itself a posted job: `start()` may be called
        // from any thread, but every resumption -- including the first --
        // must happen on the loop thread.
        let first = spawned.clone();
        scheduler.post(move || Self::poll_once(first));
    }

    fn poll_once(self: Arc<Self>) {
        let mut slot = self.fut.lock().unwrap();
        let Some(mut fut) = slot.take() else {
            // Woken after already completing (or while another poll is
            // somehow in flight); nothing to do.
            return;
        };
        drop(slot);

        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(result) => {
                if let Err(err) = result {
                    tracing::warn!(task.id = ?self.id, error = %err, "detached task failed");
                } else {
                    tracing::trace!(task.id = ?self.id, "detached task completed");
                }
            }
            Poll::Pending => {
                *self.fut.lock().unwrap() = Some(fut);
            }
        }
    }
}

impl<T: Send + 'static> Wake for Spawned<T> {
    fn wake(self: Arc<Self>) {
        let scheduler = self.scheduler.clone();
        scheduler.post(move || Self::poll_once(self));
    }
}
