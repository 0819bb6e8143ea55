//! The single-threaded event loop: a FIFO job queue, a blocking `run`, and a
//! cooperative `stop`.
//!
//! This is the only place in the crate where user coroutines actually run.
//! Every other subsystem (the thread pool, the timer thread, the signal
//! capture thread, the network I/O thread) only ever reaches back into a
//! running task by [`Scheduler::post`]ing a job here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// A type-erased, move-only, run-at-most-once unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    queue: Mutex<VecDeque<Job>>,
    not_empty: Condvar,
    stop_requested: AtomicBool,
    running: AtomicBool,
}

/// A FIFO job queue driven by exactly one thread at a time.
#[derive(Clone)]
pub struct Scheduler {
    inner: std::sync::Arc<Inner>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                not_empty: Condvar::new(),
                stop_requested: AtomicBool::new(false),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueue `job` at the tail of the queue and wake one waiter.
    ///
    /// Thread-safe, never blocks beyond acquiring the queue mutex, and never
    /// fails: there is no bounded-queue variant in this version (see
    /// [`crate::ErrorKind::Rejected`]'s doc comment).
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        let mut queue = self.inner.queue.lock().unwrap();
        queue.push_back(Box::new(job));
        tracing::trace!(queued = queue.len(), "posted job");
        drop(queue);
        self.inner.not_empty.notify_one();
    }

    /// Must be called by exactly one thread -- the *loop thread* -- for the
    /// lifetime of this scheduler's use. Blocks until [`Scheduler::stop`] is
    /// called and the queue has been drained of everything that was present
    /// when `stop` took effect.
    pub fn run(&self) {
        self.inner.running.store(true, Ordering::Release);
        tracing::info!("event loop starting");

        loop {
            let job = {
                let mut queue = self.inner.queue.lock().unwrap();
                loop {
                    if let Some(job) = queue.pop_front() {
                        break Some(job);
                    }
                    if self.inner.stop_requested.load(Ordering::Acquire) {
                        break None;
                    }
                    queue = self.inner.not_empty.wait(queue).unwrap();
                }
            };

            match job {
                Some(job) => {
                    tracing::trace!("executing job");
                    job();
                }
                None => break,
            }
        }

        self.inner.running.store(false, Ordering::Release);
        tracing::info!("event loop stopped");
    }

    /// Request that [`Scheduler::run`] return once the queue empties out.
    /// Does not drop pending jobs and does not block.
    pub fn stop(&self) {
        self.inner.stop_requested.store(true, Ordering::Release);
        self.inner.not_empty.notify_all();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn fifo_dispatch_order() {
        let scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            let scheduler_for_stop = scheduler.clone();
            scheduler.post(move || {
                order.lock().unwrap().push(i);
                if i == 4 {
                    scheduler_for_stop.stop();
                }
            });
        }

        scheduler.run();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn stop_unblocks_run_with_no_jobs() {
        let scheduler = Scheduler::new();
        scheduler.stop();
        scheduler.run();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn post_from_other_thread_is_observed() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let spawned = {
            let scheduler = scheduler.clone();
            let counter = counter.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(10));
                counter.fetch_add(1, Ordering::SeqCst);
                scheduler.stop();
            })
        };

        scheduler.run();
        spawned.join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
