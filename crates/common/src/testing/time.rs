//! Time abstraction for the retry core
//!
//! Circuit breakers, retry budgets and the executor's deadline all read time
//! through [`Clock`], so tests can drive recovery timeouts and budget windows
//! without waiting.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use deepsource_common::testing::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(30));
//! assert_eq!(clock.now().duration_since(start), Duration::from_secs(30));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync + 'static {
    /// Monotonic reading used for windows, recovery timeouts and deadlines
    fn now(&self) -> Instant;

    /// Wall-clock reading; HTTP-date `Retry-After` values are measured against it
    fn system_time(&self) -> SystemTime;
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        T::now(self)
    }

    fn system_time(&self) -> SystemTime {
        T::system_time(self)
    }
}

/// Clock that only moves when told to
///
/// Every clone reads the same offset, so the handle given to a breaker or
/// budget manager follows `advance` calls made from the test body.
#[derive(Debug, Clone)]
pub struct MockClock {
    origin: Instant,
    wall_origin: SystemTime,
    offset_nanos: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::with_system_time(SystemTime::now())
    }

    /// Anchor the wall-clock reading at `wall_origin`
    pub fn with_system_time(wall_origin: SystemTime) -> Self {
        Self { origin: Instant::now(), wall_origin, offset_nanos: Arc::new(AtomicU64::new(0)) }
    }

    /// Move both readings forward by `step`
    pub fn advance(&self, step: Duration) {
        let nanos = u64::try_from(step.as_nanos()).unwrap_or(u64::MAX);
        let _ = self.offset_nanos.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            Some(current.saturating_add(nanos))
        });
    }

    /// Total simulated time since construction
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.wall_origin + self.elapsed()
    }
}
