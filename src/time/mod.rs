//! The timer facility: a dedicated thread owning a min-heap of deadlines,
//! each paired with a one-shot completion channel.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::scheduler::Scheduler;
use crate::sync::oneshot;
use crate::task::Task;

struct Entry {
    deadline: Instant,
    sequence: u64,
    tx: oneshot::Sender<Result<(), Error>>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.sequence).cmp(&(other.deadline, other.sequence))
    }
}

struct Shared {
    heap: Mutex<BinaryHeap<Reverse<Entry>>>,
    wake: Condvar,
    stop: AtomicBool,
    next_seq: AtomicU64,
}

fn fire(scheduler: &Scheduler, entries: Vec<Entry>, result: impl Fn() -> Result<(), Error>) {
    for entry in entries {
        let tx = entry.tx;
        let value = result();
        scheduler.post(move || {
            let _ = tx.send(value);
        });
    }
}

fn timer_loop(scheduler: Scheduler, shared: Arc<Shared>) {
    let _span = tracing::info_span!("timer thread").entered();
    let mut heap = shared.heap.lock().unwrap();

    loop {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        match heap.peek() {
            None => {
                heap = shared.wake.wait(heap).unwrap();
                continue;
            }
            Some(Reverse(entry)) => {
                let now = Instant::now();
                if entry.deadline > now {
                    let timeout = entry.deadline - now;
                    let (next, _timed_out) = shared.wake.wait_timeout(heap, timeout).unwrap();
                    heap = next;
                    continue;
                }
            }
        }

        let now = Instant::now();
        let mut ready = Vec::new();
        while let Some(Reverse(entry)) = heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(Reverse(entry)) = heap.pop() {
                tracing::trace!(sequence = entry.sequence, "timer fired");
                ready.push(entry);
            }
        }
        drop(heap);
        fire(&scheduler, ready, || Ok(()));
        heap = shared.heap.lock().unwrap();
    }

    let mut remaining = Vec::new();
    while let Some(Reverse(entry)) = heap.pop() {
        remaining.push(entry);
    }
    drop(heap);
    tracing::debug!(pending = remaining.len(), "timer thread stopping");
    fire(&scheduler, remaining, || Err(Error::canceled()));
}

/// A dedicated timer thread backing `sleep`/`sleep_until`.
pub struct Timers {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Timers {
    pub(crate) fn new(scheduler: Scheduler) -> Arc<Self> {
        let shared = Arc::new(Shared {
            heap: Mutex::new(BinaryHeap::new()),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
        });

        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("taskloop-timer".into())
            .spawn(move || timer_loop(scheduler, thread_shared))
            .expect("failed to spawn timer thread");

        tracing::info!("timer thread started");
        Arc::new(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// A task that completes once `duration` has elapsed.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> Task<()> {
        self.sleep_until(Instant::now() + duration)
    }

    /// A task that completes once `deadline` has passed.
    #[must_use]
    pub fn sleep_until(&self, deadline: Instant) -> Task<()> {
        let (tx, rx) = oneshot::channel::<Result<(), Error>>();
        let sequence = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);

        {
            let mut heap = self.shared.heap.lock().unwrap();
            let wake_needed = heap
                .peek()
                .map_or(true, |Reverse(current)| deadline < current.deadline);
            heap.push(Reverse(Entry {
                deadline,
                sequence,
                tx,
            }));
            drop(heap);
            if wake_needed {
                self.shared.wake.notify_one();
            }
        }

        Task::new(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::closed()),
            }
        })
    }

    /// Fire every pending sleep with a `canceled` completion, then join the
    /// timer thread. Idempotent.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.wake.notify_all();
        if let Some(thread) = self.thread.lock().unwrap().take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Runtime;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn sleep_resolves_after_duration_elapses() {
        let rt = Runtime::new();
        let timers = rt.timers();
        let started = Instant::now();
        let observed = Arc::new(StdMutex::new(None));
        let observed_clone = observed.clone();
        let rt_clone = rt.clone();

        let driver: Task<()> = Task::new(async move {
            timers.sleep(Duration::from_millis(20)).await.unwrap();
            *observed_clone.lock().unwrap() = Some(started.elapsed());
            rt_clone.stop();
            Ok(())
        });
        driver.start(&rt);
        rt.run();

        let elapsed = observed.lock().unwrap().unwrap();
        assert!(elapsed >= Duration::from_millis(15));
    }

    #[test]
    fn earlier_deadline_registered_second_still_fires_first() {
        let rt = Runtime::new();
        let timers = rt.timers();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let order_a = order.clone();
        let rt_a = rt.clone();
        let timers_a = timers.clone();
        let late: Task<()> = Task::new(async move {
            timers_a.sleep(Duration::from_millis(60)).await.unwrap();
            order_a.lock().unwrap().push("late");
            rt_a.stop();
            Ok(())
        });
        late.start(&rt);

        let order_b = order.clone();
        let timers_b = timers.clone();
        let early: Task<()> = Task::new(async move {
            timers_b.sleep(Duration::from_millis(10)).await.unwrap();
            order_b.lock().unwrap().push("early");
            Ok(())
        });
        early.start(&rt);

        rt.run();
        assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
    }

    #[test]
    fn stop_cancels_pending_sleeps() {
        let rt = Runtime::new();
        let timers = rt.timers();
        let observed = Arc::new(StdMutex::new(None));
        let observed_clone = observed.clone();

        let driver: Task<()> = Task::new(async move {
            let result = timers.sleep(Duration::from_secs(60)).await;
            *observed_clone.lock().unwrap() = Some(result);
            Ok(())
        });
        driver.start(&rt);

        let rt_for_stop = rt.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            rt_for_stop.timers().stop();
            rt_for_stop.stop();
        });
        rt.run();

        let observed = observed.lock().unwrap();
        let result = observed.as_ref().unwrap();
        assert_eq!(result.as_ref().unwrap_err().kind(), crate::ErrorKind::Canceled);
    }
}
