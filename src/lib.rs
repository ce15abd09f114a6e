//! # telegram-lake
//!
//! Resilient Telegram channel scraping into a date-partitioned JSON data
//! lake, with a loading stage into a SQLite warehouse.
//!
//! ## Design Philosophy
//!
//! telegram-lake is designed to be:
//! - **Resilient** - a failed message never fails its channel, and a failed channel never fails the run
//! - **Sensible defaults** - works out of the box with zero configuration
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! The transport is pluggable: the scraper drives any
//! [`ChannelSession`](session::ChannelSession) implementation, so tests
//! run against scripted sessions and production wires in a real client.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use telegram_lake::{ChannelScraper, Config, run_with_shutdown};
//! use telegram_lake::session::ChannelSession;
//!
//! # async fn example(session: Arc<dyn ChannelSession>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::from_env()?;
//! config.telegram.channels = vec!["CheMed123".into(), "lobelia4cosmetics".into()];
//!
//! let scraper = ChannelScraper::new(config, session).await?;
//!
//! // Subscribe to events
//! let mut events = scraper.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! // Run with automatic signal handling
//! let report = run_with_shutdown(scraper).await?;
//! println!(
//!     "{} records across {} channels",
//!     report.total_records(),
//!     report.channels.len()
//! );
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Date-partitioned lake file writing
pub mod lake;
/// Lake-to-warehouse loading
pub mod loader;
/// Media download and path layout
pub mod media;
/// Raw-message normalization and validation
pub mod normalize;
/// Proactive message pacing
pub mod pacing;
/// Error classification and backoff scheduling
pub mod retry;
/// Core scraper implementation (decomposed into focused submodules)
pub mod scraper;
/// Channel session abstraction over the message provider
pub mod session;
/// Core types and events
pub mod types;
/// SQLite warehouse persistence
pub mod warehouse;

// Re-export commonly used types
pub use config::{
    Config, PacingConfig, RetryConfig, ScrapeConfig, StorageConfig, TelegramConfig,
};
pub use error::{Error, Result, SessionError, WarehouseError};
pub use lake::LakeWriter;
pub use loader::{LakeLoader, LoadStats};
pub use media::MediaFetcher;
pub use scraper::ChannelScraper;
pub use session::{ChannelHandle, ChannelSession, RawMedia, RawMessage};
pub use types::{
    ChannelFailure, ChannelOutcome, ChannelScrape, ChannelSummary, Event, MediaType, MessageId,
    ScrapeReport, ScrapedMessage,
};
pub use warehouse::Warehouse;

/// Helper function to run a full scrape with graceful signal handling.
///
/// Drives [`ChannelScraper::scrape_all`] while listening for a
/// termination signal in the background; on a signal the scraper's
/// `shutdown()` method is called and the partial report is returned once
/// in-flight work has been flushed.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use telegram_lake::{ChannelScraper, Config, run_with_shutdown};
/// # use telegram_lake::session::ChannelSession;
///
/// # async fn example(session: Arc<dyn ChannelSession>) -> Result<(), Box<dyn std::error::Error>> {
/// let scraper = ChannelScraper::new(Config::from_env()?, session).await?;
///
/// // Run with automatic signal handling
/// let report = run_with_shutdown(scraper).await?;
/// # let _ = report;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(scraper: ChannelScraper) -> Result<types::ScrapeReport> {
    let signal_scraper = scraper.clone();
    let signal_task = tokio::spawn(async move {
        wait_for_signal().await;
        signal_scraper.shutdown();
    });

    let report = scraper.scrape_all().await;

    // The run finished on its own; stop waiting for a signal.
    signal_task.abort();
    report
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
