//! Time abstraction for testability.
//!
//! The session tracks wall-clock progress for its poll cadence and
//! idle timeout. Routing every time read through [`Clock`] lets tests
//! drive those timers deterministically with [`MockClock`].
//!
//! # Example
//!
//! ```
//! use mailtether_imap::time::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let started = clock.now();
//! let elapsed = clock.elapsed(started);
//! assert!(elapsed >= std::time::Duration::ZERO);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Time elapsed since the given instant.
    fn elapsed(&self, since: Instant) -> Duration {
        self.now().duration_since(since)
    }

    /// Whether at least `duration` has passed since the given instant.
    fn has_elapsed(&self, since: Instant, duration: Duration) -> bool {
        self.elapsed(since) >= duration
    }
}

/// Real time via `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
///
/// Starts at a base instant; [`advance`](Self::advance) moves it
/// forward. Share one between a test and a session via
/// [`shared`](Self::shared).
#[derive(Debug)]
pub struct MockClock {
    base: Instant,
    offset_nanos: AtomicU64,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Creates a mock clock anchored at the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Creates a mock clock behind an `Arc` so a test can keep one
    /// handle while the session owns another.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Moves the clock forward. Durations beyond ~584 years truncate.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    fn offset(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }
}

impl Clock for Arc<MockClock> {
    fn now(&self) -> Instant {
        self.as_ref().now()
    }
}

/// Boxed clock for dynamic dispatch.
pub type BoxClock = Box<dyn Clock>;

impl Clock for BoxClock {
    fn now(&self) -> Instant {
        self.as_ref().now()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_tracks_real_time() {
        let clock = SystemClock;
        let before = Instant::now();
        let from_clock = clock.now();
        let after = Instant::now();
        assert!(from_clock >= before);
        assert!(from_clock <= after);
    }

    #[test]
    fn mock_clock_advances_only_on_request() {
        let clock = MockClock::new();
        let start = clock.now();
        assert_eq!(clock.elapsed(start), Duration::ZERO);

        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.elapsed(start), Duration::from_secs(10));

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.elapsed(start), Duration::from_secs(15));
    }

    #[test]
    fn has_elapsed_is_inclusive() {
        let clock = MockClock::new();
        let start = clock.now();

        assert!(!clock.has_elapsed(start, Duration::from_secs(5)));
        clock.advance(Duration::from_secs(5));
        assert!(clock.has_elapsed(start, Duration::from_secs(5)));
        assert!(!clock.has_elapsed(start, Duration::from_secs(6)));
    }

    #[test]
    fn shared_handles_see_the_same_time() {
        let clock = MockClock::shared();
        let other = Arc::clone(&clock);

        let start = clock.now();
        other.advance(Duration::from_secs(10));
        assert_eq!(clock.elapsed(start), Duration::from_secs(10));
    }
}
