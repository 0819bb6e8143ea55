//! Internal synchronization primitives used to hand a single value from a
//! producer thread (pool worker, timer thread, signal capture thread, net
//! thread) back to whichever task is awaiting it.

pub mod oneshot;
