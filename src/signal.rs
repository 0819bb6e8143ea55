//! The OS signal bridge: a dedicated capture thread that turns delivered Unix
//! signals into jobs posted back onto the event loop.
//!
//! Not available on non-Unix targets; every entry point returns
//! [`crate::ErrorKind::NotSupported`] there instead.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::scheduler::Scheduler;
use crate::sync::oneshot;
use crate::task::Task;

type Callback = Box<dyn Fn(i32) + Send + Sync>;

struct State {
    enabled: Mutex<HashSet<i32>>,
    callbacks: Mutex<Vec<Callback>>,
    waiter: Mutex<Option<oneshot::Sender<i32>>>,
    pending: Mutex<VecDeque<i32>>,
}

impl State {
    fn new() -> Self {
        Self {
            enabled: Mutex::new(HashSet::new()),
            callbacks: Mutex::new(Vec::new()),
            waiter: Mutex::new(None),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Delivery ordering: `on_signal` callbacks first, then the waiter (if
    /// one is in flight), else the signal is queued into `pending` for the
    /// next `async_wait`.
    fn deliver(&self, signal: i32) {
        if !self.enabled.lock().unwrap().contains(&signal) {
            return;
        }
        tracing::debug!(signal, "signal delivered");
        for cb in self.callbacks.lock().unwrap().iter() {
            cb(signal);
        }
        match self.waiter.lock().unwrap().take() {
            Some(tx) => {
                let _ = tx.send(signal);
            }
            None => self.pending.lock().unwrap().push_back(signal),
        }
    }
}

/// A future that completes with the next matching signal, or with a
/// `canceled` failure once `token` is cancelled.
struct WaitSignal {
    token: CancelToken,
    rx: oneshot::Receiver<i32>,
}

impl Future for WaitSignal {
    type Output = Result<i32, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.token.is_cancelled() {
            return Poll::Ready(Err(Error::canceled()));
        }
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| Error::closed()))
    }
}

#[cfg(unix)]
mod platform {
    use super::*;
    use signal_hook::iterator::Signals;

    pub(super) struct Capture {
        handle: signal_hook::iterator::Handle,
        thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    }

    impl Capture {
        pub(super) fn start(scheduler: Scheduler, state: Arc<State>) -> Result<Self, Error> {
            let mut signals = Signals::new([]).map_err(Error::io)?;
            let handle = signals.handle();
            let thread = std::thread::Builder::new()
                .name("taskloop-signal".into())
                .spawn(move || {
                    for signal in &mut signals {
                        let state = state.clone();
                        scheduler.post(move || state.deliver(signal));
                    }
                    tracing::debug!("signal capture thread exiting");
                })
                .map_err(Error::io)?;
            Ok(Self {
                handle,
                thread: Mutex::new(Some(thread)),
            })
        }

        pub(super) fn add(&self, signal: i32) -> Result<(), Error> {
            self.handle.add_signal(signal).map_err(Error::io)
        }

        pub(super) fn stop(&self) {
            self.handle.close();
            if let Some(thread) = self.thread.lock().unwrap().take() {
                let _ = thread.join();
            }
        }
    }
}

/// Translates delivered OS signals into either registered callbacks or a
/// single pending [`SignalBridge::async_wait`] task.
pub struct SignalBridge {
    state: Arc<State>,
    #[cfg(unix)]
    capture: Option<platform::Capture>,
}

impl SignalBridge {
    pub(crate) fn new(#[cfg_attr(not(unix), allow(unused_variables))] scheduler: Scheduler) -> Arc<Self> {
        let state = Arc::new(State::new());

        #[cfg(unix)]
        let capture = match platform::Capture::start(scheduler, state.clone()) {
            Ok(capture) => Some(capture),
            Err(err) => {
                tracing::warn!(error = %err, "failed to start signal capture thread");
                None
            }
        };

        Arc::new(Self {
            state,
            #[cfg(unix)]
            capture,
        })
    }

    /// Start delivering `signal` to callbacks and waiters. A no-op if already
    /// enabled.
    #[cfg(unix)]
    pub fn add(&self, signal: i32) -> Result<(), Error> {
        let Some(capture) = self.capture.as_ref() else {
            return Err(Error::not_supported("signal capture thread unavailable"));
        };
        capture.add(signal)?;
        self.state.enabled.lock().unwrap().insert(signal);
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn add(&self, _signal: i32) -> Result<(), Error> {
        Err(Error::not_supported("signal bridge is unix-only"))
    }

    /// Stop delivering `signal`. The OS-level registration is left in place;
    /// deliveries are filtered out on arrival instead, since the underlying
    /// capture thread has no per-signal unregister.
    pub fn remove(&self, signal: i32) {
        self.state.enabled.lock().unwrap().remove(&signal);
    }

    /// Register a callback invoked (on the loop thread) for every delivery of
    /// any enabled signal.
    pub fn on_signal(&self, callback: impl Fn(i32) + Send + Sync + 'static) {
        self.state.callbacks.lock().unwrap().push(Box::new(callback));
    }

    /// Wait for the next enabled signal. If one already arrived with no
    /// waiter in flight, it is consumed from `pending` immediately. Only one
    /// outstanding wait is supported at a time.
    pub fn async_wait(&self, token: CancelToken) -> Task<i32> {
        if let Some(signal) = self.state.pending.lock().unwrap().pop_front() {
            return Task::new(async move { Ok(signal) });
        }

        let (tx, rx) = oneshot::channel::<i32>();
        {
            let mut waiter = self.state.waiter.lock().unwrap();
            debug_assert!(
                waiter.is_none(),
                "SignalBridge::async_wait does not support concurrent waiters"
            );
            *waiter = Some(tx);
        }
        Task::new(WaitSignal { token, rx })
    }

    pub fn stop(&self) {
        #[cfg(unix)]
        if let Some(capture) = self.capture.as_ref() {
            capture.stop();
        }
    }
}
