//! A single-threaded cooperative task runtime.
//!
//! User coroutines ([`task::Task`]) run exclusively on the thread that calls
//! [`context::Runtime::run`]. Everything else -- the CPU thread pool, the
//! timer thread, the signal capture thread, and the network I/O thread --
//! only ever communicates back to that thread by [`scheduler::Scheduler::post`]ing
//! a job.

pub mod cancel;
pub mod context;
pub mod error;
pub mod net;
pub mod pool;
pub mod scheduler;
pub mod signal;
pub mod sync;
pub mod task;
pub mod time;

pub use cancel::{CancelSource, CancelToken};
pub use context::Runtime;
pub use error::{Error, ErrorKind};
pub use scheduler::Scheduler;
pub use task::{spawn_detached, Task};
