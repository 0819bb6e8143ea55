//! The CPU thread pool: a fixed set of worker threads draining a shared
//! job queue, plus a cancellation-aware submission that hands its result
//! back to the event loop as a [`Task`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::scheduler::Scheduler;
use crate::sync::oneshot;
use crate::task::Task;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    not_empty: Condvar,
    stop: AtomicBool,
}

fn worker_loop(id: usize, shared: Arc<Shared>) {
    let _span = tracing::info_span!("pool worker", worker = id).entered();
    loop {
        let job = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if shared.stop.load(Ordering::Acquire) {
                    break None;
                }
                queue = shared.not_empty.wait(queue).unwrap();
            }
        };

        match job {
            Some(job) => {
                tracing::trace!(worker = id, "executing job");
                job();
            }
            None => {
                tracing::debug!(worker = id, "stop observed, worker exiting");
                break;
            }
        }
    }
}

/// N workers draining a shared FIFO closure queue.
pub struct ThreadPool {
    shared: Arc<Shared>,
    scheduler: Scheduler,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Build a pool bound to `scheduler`'s loop, with `n` workers (defaulting
    /// to the platform's hardware thread count, floored at 1).
    pub(crate) fn new(scheduler: Scheduler, n: Option<usize>) -> Arc<Self> {
        let n = n
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(std::num::NonZeroUsize::get)
                    .unwrap_or(1)
            })
            .max(1);

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let workers = (0..n)
            .map(|id| {
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("taskloop-pool-{id}"))
                    .spawn(move || worker_loop(id, shared))
                    .expect("failed to spawn thread-pool worker")
            })
            .collect();

        tracing::info!(workers = n, "thread pool started");

        Arc::new(Self {
            shared,
            scheduler,
            workers: Mutex::new(workers),
        })
    }

    /// Fire-and-forget submission: enqueue `f` and return immediately.
    pub fn submit(&self, f: impl FnOnce() + Send + 'static) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(Box::new(f));
        drop(queue);
        self.shared.not_empty.notify_one();
    }

    /// Submit `f` and return a [`Task`] that completes on the loop thread
    /// with `f`'s result (or a `canceled` failure if `token` was already
    /// cancelled by the time a worker picked the job up).
    pub fn submit_task<F, R>(&self, f: F, token: CancelToken) -> Task<R>
    where
        F: FnOnce() -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<R, Error>>();
        let scheduler = self.scheduler.clone();

        self.submit(move || {
            let result = if token.is_cancelled() {
                Err(Error::canceled())
            } else {
                f()
            };
            // Hand the result back to the loop thread: the `send` (and the
            // wake it triggers) always happens as a posted job, never
            // directly from this worker thread.
            scheduler.post(move || {
                let _ = tx.send(result);
            });
        });

        Task::new(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::closed()),
            }
        })
    }

    /// Request that every worker exit once its current job (if any)
    /// finishes, and join all of them. Idempotent.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.not_empty.notify_all();

        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Runtime;

    #[test]
    fn submit_task_resumes_on_loop_thread_with_result() {
        let rt = Runtime::new();
        let pool = rt.cpu_pool();
        let main_thread = std::thread::current().id();
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();
        let rt_clone = rt.clone();

        let driver: Task<()> = Task::new(async move {
            let sum = pool
                .submit_task(
                    move || Ok::<i64, Error>((0..100_000i64).map(|i| i % 7).sum()),
                    CancelToken::empty(),
                )
                .await
                .unwrap();
            *observed_clone.lock().unwrap() = Some((sum, std::thread::current().id()));
            rt_clone.stop();
            Ok(())
        });
        driver.start(&rt);
        rt.run();

        let observed = observed.lock().unwrap();
        let (sum, thread_id) = observed.as_ref().unwrap();
        assert!(*sum >= 0);
        assert_eq!(*thread_id, main_thread);
    }

    #[test]
    fn cancelled_submission_fails_with_canceled_kind() {
        use crate::cancel::CancelSource;
        use crate::error::ErrorKind;

        let rt = Runtime::new();
        let pool = rt.cpu_pool();
        let source = CancelSource::new();
        source.request_cancel();
        let token = source.token();
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();
        let rt_clone = rt.clone();

        let driver: Task<()> = Task::new(async move {
            let result = pool.submit_task(|| Ok::<i32, Error>(1), token).await;
            *observed_clone.lock().unwrap() = Some(result);
            rt_clone.stop();
            Ok(())
        });
        driver.start(&rt);
        rt.run();

        let observed = observed.lock().unwrap();
        let result = observed.as_ref().unwrap();
        assert_eq!(result.as_ref().unwrap_err().kind(), ErrorKind::Canceled);
    }

    #[test]
    fn submit_fire_and_forget_runs() {
        let rt = Runtime::new();
        let pool = rt.cpu_pool();
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran_clone = ran.clone();
        pool.submit(move || ran_clone.store(true, Ordering::SeqCst));
        pool.stop();
        assert!(ran.load(Ordering::SeqCst));
    }
}
