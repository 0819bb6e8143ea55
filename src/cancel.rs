//! Cooperative cancellation: a shared, monotonic flag split into a writer
//! (`CancelSource`) and a cheaply-cloneable reader (`CancelToken`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Inner {
    cancelled: AtomicBool,
}

/// The unique writer half of a cancellation flag.
///
/// Dropping the source does not cancel outstanding tokens; cancellation is
/// requested explicitly via [`CancelSource::request_cancel`].
#[derive(Debug)]
pub struct CancelSource {
    inner: Arc<Inner>,
}

impl CancelSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Produce a new reader over this source's flag. Tokens may outlive the
    /// source that minted them.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            inner: Some(self.inner.clone()),
        }
    }

    /// Set the flag. Idempotent; release-ordered so every subsequent
    /// `is_cancelled` observation on any thread returns `true`.
    pub fn request_cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared reader over a cancellation flag, or an empty token that can never
/// be cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Option<Arc<Inner>>,
}

impl CancelToken {
    /// A token backed by no source: `can_cancel()` and `is_cancelled()` are
    /// always `false`.
    #[must_use]
    pub fn empty() -> Self {
        Self { inner: None }
    }

    #[must_use]
    pub fn can_cancel(&self) -> bool {
        self.inner.is_some()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.cancelled.load(Ordering::Acquire))
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_cancel_is_idempotent() {
        let source = CancelSource::new();
        source.request_cancel();
        source.request_cancel();
        assert!(source.is_cancelled());
    }

    #[test]
    fn tokens_share_state_across_clones() {
        let source = CancelSource::new();
        let a = source.token();
        let b = a.clone();
        source.request_cancel();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }
}
