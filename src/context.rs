//! The runtime context: owns the scheduler and lazily builds each subsystem
//! on first access.

use std::sync::{Arc, OnceLock};

use crate::net::NetBridge;
use crate::pool::ThreadPool;
use crate::scheduler::Scheduler;
use crate::signal::SignalBridge;
use crate::time::Timers;

struct Inner {
    scheduler: Scheduler,
    pool: OnceLock<Arc<ThreadPool>>,
    timers: OnceLock<Arc<Timers>>,
    signals: OnceLock<Arc<SignalBridge>>,
    net: OnceLock<Arc<NetBridge>>,
}

/// The user-owned container for a single event loop and its subsystems.
///
/// Cheap to clone: every clone shares the same scheduler and the same
/// lazily-built subsystems. The last clone to drop tears everything down, in
/// the order pool -> signals -> net -> timers, before the scheduler itself
/// goes away.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler: Scheduler::new(),
                pool: OnceLock::new(),
                timers: OnceLock::new(),
                signals: OnceLock::new(),
                net: OnceLock::new(),
            }),
        }
    }

    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        self.inner.scheduler.post(job);
    }

    pub fn run(&self) {
        self.inner.scheduler.run();
    }

    pub fn stop(&self) {
        self.inner.scheduler.stop();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// The CPU thread pool, built with the platform's hardware thread count
    /// on first access.
    #[must_use]
    pub fn cpu_pool(&self) -> Arc<ThreadPool> {
        self.inner
            .pool
            .get_or_init(|| ThreadPool::new(self.inner.scheduler.clone(), None))
            .clone()
    }

    /// The timer facility, built on first access.
    #[must_use]
    pub fn timers(&self) -> Arc<Timers> {
        self.inner
            .timers
            .get_or_init(|| Timers::new(self.inner.scheduler.clone()))
            .clone()
    }

    /// The OS signal bridge, built on first access.
    #[must_use]
    pub fn signals(&self) -> Arc<SignalBridge> {
        self.inner
            .signals
            .get_or_init(|| SignalBridge::new(self.inner.scheduler.clone()))
            .clone()
    }

    /// The network-service bridge, built on first access.
    #[must_use]
    pub fn net(&self) -> Arc<NetBridge> {
        self.inner
            .net
            .get_or_init(|| NetBridge::new(self.inner.scheduler.clone()))
            .clone()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Explicit, ordered teardown: pool -> signals -> net -> timers,
        // regardless of how many other `Arc` clones of a subsystem are
        // still outstanding elsewhere, then the scheduler (no thread of its
        // own) simply drops along with the rest of `Inner`.
        if let Some(pool) = self.pool.get() {
            pool.stop();
        }
        if let Some(signals) = self.signals.get() {
            signals.stop();
        }
        if let Some(net) = self.net.get() {
            net.stop();
        }
        if let Some(timers) = self.timers.get() {
            timers.stop();
        }
    }
}
