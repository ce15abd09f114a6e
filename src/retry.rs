//! Failure classification and backoff scheduling for channel scrapes
//!
//! A failed scrape attempt falls into one of three buckets: flood waits
//! (the remote dictates a pause; retries are free), permanently gone
//! channels (retrying is pointless), and transient faults (retried with a
//! linearly escalating delay until the budget runs out).
//!
//! # Example
//!
//! ```
//! use telegram_lake::config::RetryConfig;
//! use telegram_lake::retry::BackoffSchedule;
//!
//! let config = RetryConfig {
//!     max_retries: 3,
//!     ..Default::default()
//! };
//! let mut schedule = BackoffSchedule::new(&config);
//!
//! // First transient failure: wait one base interval, then try again.
//! assert!(schedule.next_delay().is_some());
//! // Second: wait two base intervals.
//! assert!(schedule.next_delay().is_some());
//! // Third failure exhausts the budget of 3 attempts.
//! assert!(schedule.next_delay().is_none());
//! ```

use crate::config::RetryConfig;
use crate::error::SessionError;
use rand::Rng;
use std::time::Duration;

/// Classification of a failed session operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt after backoff
    Transient,

    /// Mandatory cooperative wait dictated by the remote; does not consume
    /// the retry budget
    FloodWait(Duration),

    /// The channel is private or inaccessible; retrying cannot help
    Private,

    /// The channel does not exist; retrying cannot help
    NotFound,
}

/// Sorts errors into retry classes
pub trait Classify {
    /// Classify this error for the scrape loop
    fn classify(&self) -> ErrorClass;
}

impl Classify for SessionError {
    fn classify(&self) -> ErrorClass {
        match self {
            SessionError::FloodWait { retry_after } => ErrorClass::FloodWait(*retry_after),
            SessionError::ChannelPrivate { .. } => ErrorClass::Private,
            SessionError::ChannelNotFound { .. } => ErrorClass::NotFound,
            // Auth errors mid-iteration get the bounded-retry treatment like
            // any other unexpected remote error; authentication proper is
            // checked once before the channel loop starts.
            SessionError::Auth(_)
            | SessionError::Network(_)
            | SessionError::Protocol(_)
            | SessionError::MediaDownload(_) => ErrorClass::Transient,
        }
    }
}

/// Backoff bookkeeping for one channel scrape.
///
/// Tracks transient failures and produces the delay before the next
/// attempt: `backoff_base * failures`. The escalation is linear rather
/// than doubling so the worst-case wall time stays proportional to the
/// retry budget. Flood waits are handled by the caller directly and never
/// advance the failure count.
#[derive(Debug)]
pub struct BackoffSchedule {
    config: RetryConfig,
    failures: u32,
}

impl BackoffSchedule {
    /// Create a fresh schedule from the retry configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            config: config.clone(),
            failures: 0,
        }
    }

    /// Record a transient failure.
    ///
    /// Returns the delay to wait before the next attempt, or `None` when
    /// the budget of `max_retries` attempts is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.config.max_retries {
            return None;
        }
        let delay = self.config.backoff_base * self.failures;
        if self.config.jitter {
            Some(add_jitter(delay, self.config.backoff_base))
        } else {
            Some(delay)
        }
    }

    /// Transient failures recorded so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Attempt number of the next try, starting at 1
    pub fn attempt(&self) -> u32 {
        self.failures + 1
    }
}

/// Add up to one base interval of random slack to a delay
fn add_jitter(delay: Duration, base: Duration) -> Duration {
    let max_extra_ms = base.as_millis() as u64;
    let extra_ms = rand::thread_rng().gen_range(0..=max_extra_ms);
    delay + Duration::from_millis(extra_ms)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_retries: u32, base_ms: u64) -> RetryConfig {
        RetryConfig {
            max_retries,
            backoff_base: Duration::from_millis(base_ms),
            jitter: false,
        }
    }

    // --- Classification ---

    #[test]
    fn flood_wait_classifies_with_its_duration() {
        let err = SessionError::FloodWait {
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(
            err.classify(),
            ErrorClass::FloodWait(Duration::from_secs(30))
        );
    }

    #[test]
    fn gone_channels_classify_as_permanent() {
        let private = SessionError::ChannelPrivate {
            channel: "x".into(),
        };
        assert_eq!(private.classify(), ErrorClass::Private);

        let missing = SessionError::ChannelNotFound {
            channel: "x".into(),
        };
        assert_eq!(missing.classify(), ErrorClass::NotFound);
    }

    #[test]
    fn network_protocol_auth_and_media_errors_classify_as_transient() {
        let errors = [
            SessionError::Network("reset".into()),
            SessionError::Protocol("bad frame".into()),
            SessionError::Auth("session revoked".into()),
            SessionError::MediaDownload("timed out".into()),
        ];
        for err in errors {
            assert_eq!(
                err.classify(),
                ErrorClass::Transient,
                "{err} should be transient"
            );
        }
    }

    // --- Schedule ---

    #[test]
    fn delays_escalate_linearly_with_failure_count() {
        let mut schedule = BackoffSchedule::new(&config(5, 10));

        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(20)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(30)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(40)));
        assert_eq!(schedule.next_delay(), None, "fifth failure exhausts 5 attempts");
    }

    #[test]
    fn budget_of_three_allows_exactly_three_attempts() {
        let mut schedule = BackoffSchedule::new(&config(3, 10));

        assert_eq!(schedule.attempt(), 1);
        assert!(schedule.next_delay().is_some(), "attempt 2 is allowed");
        assert_eq!(schedule.attempt(), 2);
        assert!(schedule.next_delay().is_some(), "attempt 3 is allowed");
        assert_eq!(schedule.attempt(), 3);
        assert!(
            schedule.next_delay().is_none(),
            "a third failure must not schedule a fourth attempt"
        );
        assert_eq!(schedule.failures(), 3);
    }

    #[test]
    fn budget_of_one_never_schedules_a_retry() {
        let mut schedule = BackoffSchedule::new(&config(1, 10));
        assert_eq!(schedule.next_delay(), None);
    }

    #[test]
    fn jitter_adds_at_most_one_base_interval() {
        let mut retry_config = config(10, 50);
        retry_config.jitter = true;
        let mut schedule = BackoffSchedule::new(&retry_config);

        for expected_failures in 1..5u32 {
            let delay = schedule.next_delay().unwrap();
            let floor = Duration::from_millis(50) * expected_failures;
            let ceiling = floor + Duration::from_millis(50);
            assert!(
                delay >= floor && delay <= ceiling,
                "delay {delay:?} out of range [{floor:?}, {ceiling:?}]"
            );
        }
    }
}
