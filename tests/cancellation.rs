//! S3 — cancel default token: a freshly constructed token has `can_cancel ==
//! false`, `is_cancelled == false`.
//!
//! S4 — cancel flow: from a fresh source, `token.is_cancelled() == false`,
//! then `src.request_cancel()`, then `token.is_cancelled() == true` and
//! `src.is_cancelled() == true`.

use taskloop::{CancelSource, CancelToken};

#[test]
fn default_token_cannot_cancel() {
    let token = CancelToken::empty();
    assert!(!token.can_cancel());
    assert!(!token.is_cancelled());
}

#[test]
fn request_cancel_is_observed_by_every_token() {
    let source = CancelSource::new();
    let token = source.token();
    assert!(!token.is_cancelled());

    source.request_cancel();

    assert!(token.is_cancelled());
    assert!(source.is_cancelled());
}
