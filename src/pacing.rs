//! Proactive pacing between bursts of processed messages
//!
//! Self-imposed pauses reduce the chance of the remote ever issuing a
//! flood wait. This pacing is independent of, and composes with, the
//! reactive backoff in [`crate::retry`]: the pacer always applies, backoff
//! only after failures.

use crate::config::PacingConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Pauses the calling flow after every batch of accepted messages.
///
/// `tick` takes `&self`; the counter is atomic so the pacer can be shared
/// behind a reference without locking.
#[derive(Debug)]
pub struct MessagePacer {
    batch_size: u64,
    pause: Duration,
    processed: AtomicU64,
}

impl MessagePacer {
    /// Create a pacer from the pacing configuration.
    ///
    /// A `batch_size` of 0 disables pacing entirely.
    pub fn new(config: &PacingConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            pause: config.pause,
            processed: AtomicU64::new(0),
        }
    }

    /// Record one accepted message, sleeping the configured pause when a
    /// batch boundary is crossed.
    ///
    /// The sleep is a suspension point; callers racing a stop signal
    /// `select!` against it.
    pub async fn tick(&self) {
        if self.batch_size == 0 {
            return;
        }
        let count = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.batch_size == 0 {
            tracing::debug!(
                processed = count,
                pause_ms = self.pause.as_millis() as u64,
                "Pacing pause"
            );
            tokio::time::sleep(self.pause).await;
        }
    }

    /// Messages recorded so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn pacer(batch_size: u64, pause_ms: u64) -> MessagePacer {
        MessagePacer::new(&PacingConfig {
            batch_size,
            pause: Duration::from_millis(pause_ms),
        })
    }

    #[tokio::test]
    async fn no_pause_before_batch_boundary() {
        let pacer = pacer(10, 200);
        let start = Instant::now();

        for _ in 0..9 {
            pacer.tick().await;
        }

        assert!(
            start.elapsed() < Duration::from_millis(100),
            "9 ticks with batch size 10 should not pause, took {:?}",
            start.elapsed()
        );
        assert_eq!(pacer.processed(), 9);
    }

    #[tokio::test]
    async fn pauses_on_the_batch_boundary() {
        let pacer = pacer(10, 100);
        let start = Instant::now();

        for _ in 0..10 {
            pacer.tick().await;
        }

        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(100),
            "10th tick should pause for the full interval, took {elapsed:?}"
        );
        assert!(
            elapsed < Duration::from_millis(600),
            "only one pause expected, took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn pauses_once_per_batch() {
        let pacer = pacer(5, 50);
        let start = Instant::now();

        for _ in 0..10 {
            pacer.tick().await;
        }

        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(100),
            "two batches of 5 should pause twice, took {elapsed:?}"
        );
        assert_eq!(pacer.processed(), 10);
    }

    #[tokio::test]
    async fn zero_batch_size_disables_pacing() {
        let pacer = pacer(0, 500);
        let start = Instant::now();

        for _ in 0..100 {
            pacer.tick().await;
        }

        assert!(
            start.elapsed() < Duration::from_millis(100),
            "disabled pacer should never sleep, took {:?}",
            start.elapsed()
        );
        assert_eq!(pacer.processed(), 0, "disabled pacer does not count");
    }
}
