//! Wall-clock abstraction.
//!
//! Components that capture "now" themselves (the token minter) take a
//! `Clock` so tests can substitute a deterministic one.

use crate::Timestamp;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The operating system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
