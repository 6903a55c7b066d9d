//! Blocking poll-until primitives shared by flows and RPC handlers.

use std::thread;
use std::time::{Duration, Instant};

/// Default cadence for flow-level polling
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Evaluates `predicate` immediately and then every `interval` until it
/// returns true or `timeout` elapses. Returns the last result.
pub fn poll_until<F>(mut predicate: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let interval = interval.max(Duration::from_millis(1));
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(interval.min(deadline - now));
    }
}

/// Like [`poll_until`] but the predicate may fail; the first `Err` stops the
/// loop and is returned unchanged.
pub fn try_poll_until<F, E>(mut predicate: F, timeout: Duration, interval: Duration) -> Result<bool, E>
where
    F: FnMut() -> Result<bool, E>,
{
    let interval = interval.max(Duration::from_millis(1));
    let deadline = Instant::now() + timeout;
    loop {
        if predicate()? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        thread::sleep(interval.min(deadline - now));
    }
}
