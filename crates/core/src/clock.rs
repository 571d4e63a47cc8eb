//! Injectable time source, so WAL group-commit timeouts and lock timeouts
//! are deterministic under test.
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// A source of the current time. Production code uses [`SystemClock`];
/// tests that need to assert on timeout behavior use [`SteppableClock`].
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only advances when told to, for deterministic tests of
/// group-commit batching and lock-wait timeouts.
pub struct SteppableClock {
    current: Mutex<DateTime<Utc>>,
}

impl SteppableClock {
    /// A clock starting at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        SteppableClock {
            current: Mutex::new(start),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.current.lock();
        *guard += delta;
    }
}

impl Clock for SteppableClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}
