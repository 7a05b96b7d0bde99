//! Time-related abstractions.
//!
//! `Instant` is Tokio's instant so that code measured against it follows the
//! paused test clock (`#[tokio::test(start_paused = true)]`).
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(10)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(10));
//! }
//! ```

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::{
    error::Elapsed, interval, interval_at, sleep, sleep_until, timeout, Instant, Interval,
    MissedTickBehavior, Sleep, Timeout,
};

/// Computes an exponential backoff delay: `initial * 2^attempt`, capped at `max`.
///
/// `attempt` is zero-based, so the first retry waits exactly `initial`.
pub fn backoff_delay(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    initial.saturating_mul(factor).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_secs(1);

        assert_eq!(backoff_delay(initial, max, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(initial, max, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(initial, max, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(initial, max, 4), max);
        assert_eq!(backoff_delay(initial, max, 40), max);
    }
}
