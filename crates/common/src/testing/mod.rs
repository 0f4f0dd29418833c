//! Testing utilities and helpers
//!
//! - **[`time`]**: [`Clock`] abstraction with a manually advanced
//!   [`MockClock`] for breaker and budget window tests
//! - **`init_test_tracing`** (unit tests and `test-utils`): installs a
//!   `tracing-subscriber` fmt layer filtered by `RUST_LOG` so retry logs
//!   show up in failing tests
//!
//! ## Usage
//!
//! ```rust
//! use deepsource_common::testing::MockClock;
//!
//! let clock = MockClock::new();
//! clock.advance(std::time::Duration::from_secs(5));
//! ```

pub mod time;

pub use time::{Clock, MockClock, SystemClock};

/// Install a global test subscriber once per process
///
/// Subsequent calls are no-ops. The filter defaults to `warn` when `RUST_LOG`
/// is not set.
#[cfg(any(test, feature = "test-utils"))]
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
