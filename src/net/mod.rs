//! The network-service bridge: a dedicated net thread running a readiness-
//! based reactor (`mio`), and the generic operation-completion adapter that
//! every network collaborator (TCP/UDP/DNS) is built on.

mod dns;
mod tcp;
mod udp;

pub use dns::DnsResolver;
pub use tcp::{TcpListener, TcpStream};
pub use udp::UdpSocket;

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use mio::{Events, Interest, Poll, Registry, Token, Waker};

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::scheduler::Scheduler;
use crate::sync::oneshot;
use crate::task::Task;

const WAKE_TOKEN: Token = Token(usize::MAX);

/// A pending reactor registration: retries its operation on every readiness
/// event for its token until it completes or the caller cancels.
trait RegisteredOp: Send {
    fn retry(&mut self, scheduler: &Scheduler) -> bool;
    fn deregister(&mut self, registry: &Registry);
}

struct Op<S, T, A> {
    source: Arc<Mutex<S>>,
    attempt: A,
    token: CancelToken,
    tx: Option<oneshot::Sender<Result<T, Error>>>,
}

impl<S, T, A> RegisteredOp for Op<S, T, A>
where
    S: mio::event::Source + Send + 'static,
    T: Send + 'static,
    A: FnMut(&mut S) -> io::Result<T> + Send + 'static,
{
    fn retry(&mut self, scheduler: &Scheduler) -> bool {
        let Some(tx) = self.tx.take() else {
            return true;
        };

        if self.token.is_cancelled() {
            let scheduler = scheduler.clone();
            scheduler.post(move || {
                let _ = tx.send(Err(Error::canceled()));
            });
            return true;
        }

        let attempted = {
            let mut guard = self.source.lock().unwrap();
            (self.attempt)(&mut guard)
        };

        match attempted {
            Ok(value) => {
                let scheduler = scheduler.clone();
                scheduler.post(move || {
                    let _ = tx.send(Ok(value));
                });
                true
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                self.tx = Some(tx);
                false
            }
            Err(err) => {
                let scheduler = scheduler.clone();
                scheduler.post(move || {
                    let _ = tx.send(Err(Error::io(err)));
                });
                true
            }
        }
    }

    fn deregister(&mut self, registry: &Registry) {
        let mut guard = self.source.lock().unwrap();
        let _ = registry.deregister(&mut *guard);
    }
}

fn reactor_loop(
    mut poll: Poll,
    ops: Arc<Mutex<HashMap<Token, Box<dyn RegisteredOp>>>>,
    scheduler: Scheduler,
    stopped: Arc<AtomicBool>,
) {
    let _span = tracing::info_span!("net reactor").entered();
    let mut events = Events::with_capacity(128);

    loop {
        match poll.poll(&mut events, None) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(error = %err, "reactor poll failed");
                break;
            }
        }

        if stopped.load(Ordering::Acquire) {
            break;
        }

        for event in &events {
            if event.token() == WAKE_TOKEN {
                continue;
            }
            let token = event.token();
            let mut map = ops.lock().unwrap();
            let Some(op) = map.get_mut(&token) else {
                continue;
            };
            let done = op.retry(&scheduler);
            if done {
                if let Some(mut op) = map.remove(&token) {
                    drop(map);
                    op.deregister(poll.registry());
                }
            }
        }
    }

    tracing::debug!("net reactor thread exiting");
}

/// Owns the reactor's registry and the net thread driving it.
pub struct NetBridge {
    registry: Registry,
    waker: Waker,
    ops: Arc<Mutex<HashMap<Token, Box<dyn RegisteredOp>>>>,
    next_token: AtomicUsize,
    stopped: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl NetBridge {
    pub(crate) fn new(scheduler: Scheduler) -> Arc<Self> {
        let poll = Poll::new().expect("failed to create mio::Poll");
        let registry = poll
            .registry()
            .try_clone()
            .expect("failed to clone mio::Registry");
        let waker = Waker::new(&registry, WAKE_TOKEN).expect("failed to create mio::Waker");
        let ops: Arc<Mutex<HashMap<Token, Box<dyn RegisteredOp>>>> = Arc::new(Mutex::new(HashMap::new()));
        let stopped = Arc::new(AtomicBool::new(false));

        let thread = {
            let scheduler = scheduler.clone();
            let ops = ops.clone();
            let stopped = stopped.clone();
            std::thread::Builder::new()
                .name("taskloop-net".into())
                .spawn(move || reactor_loop(poll, ops, scheduler, stopped))
                .expect("failed to spawn net reactor thread")
        };

        tracing::info!("net reactor started");
        Arc::new(Self {
            registry,
            waker,
            ops,
            next_token: AtomicUsize::new(0),
            stopped,
            thread: Mutex::new(Some(thread)),
        })
    }

    fn op_task<T: Send + 'static>(rx: oneshot::Receiver<Result<T, Error>>) -> Task<T> {
        Task::new(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::closed()),
            }
        })
    }

    /// The generic operation adapter: attempt `attempt(&mut source)` directly
    /// first; if it would block, register `source` with the reactor under a
    /// fresh token and retry on every readiness event.
    fn schedule<S, T, A>(&self, source: Arc<Mutex<S>>, interest: Interest, token: CancelToken, mut attempt: A) -> Task<T>
    where
        S: mio::event::Source + Send + 'static,
        T: Send + 'static,
        A: FnMut(&mut S) -> io::Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T, Error>>();

        if token.is_cancelled() {
            let _ = tx.send(Err(Error::canceled()));
            return Self::op_task(rx);
        }

        let immediate = {
            let mut guard = source.lock().unwrap();
            attempt(&mut guard)
        };

        match immediate {
            Ok(value) => {
                let _ = tx.send(Ok(value));
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                self.register(source, interest, token, attempt, tx);
            }
            Err(err) => {
                let _ = tx.send(Err(Error::io(err)));
            }
        }

        Self::op_task(rx)
    }

    fn register<S, T, A>(
        &self,
        source: Arc<Mutex<S>>,
        interest: Interest,
        token: CancelToken,
        attempt: A,
        tx: oneshot::Sender<Result<T, Error>>,
    ) where
        S: mio::event::Source + Send + 'static,
        T: Send + 'static,
        A: FnMut(&mut S) -> io::Result<T> + Send + 'static,
    {
        let mio_token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        let registered = {
            let mut guard = source.lock().unwrap();
            self.registry.register(&mut *guard, mio_token, interest)
        };
        if let Err(err) = registered {
            let _ = tx.send(Err(Error::io(err)));
            return;
        }
        tracing::trace!(token = mio_token.0, "registered with reactor");
        let op: Box<dyn RegisteredOp> = Box::new(Op {
            source,
            attempt,
            token,
            tx: Some(tx),
        });
        self.ops.lock().unwrap().insert(mio_token, op);
    }

    /// Ask the net thread to exit and join it. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.waker.wake();
        if let Some(thread) = self.thread.lock().unwrap().take() {
            let _ = thread.join();
        }
    }
}

impl Drop for NetBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
