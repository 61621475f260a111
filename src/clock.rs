//! Injectable time source.
//!
//! Timestamps show up in chunk ids and chunk metadata; threading a [`Clock`] through
//! rather than calling `jiff::Timestamp::now()` directly keeps the streaming state
//! machine deterministic under test.

use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;

    fn now_s(&self) -> i64 {
        self.now_ms() / 1000
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        jiff::Timestamp::now().as_millisecond()
    }
}

pub fn system() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// A clock that always reports the same instant. Used by tests that assert on
/// exact chunk ids and timestamps.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}
