//! Core scraper implementation split into focused submodules.
//!
//! The `ChannelScraper` struct and its methods are organized by domain:
//! - [`channel`] - Single-channel iteration with retry, pacing, and media
//! - [`run`] - Full-run orchestration across the configured channels

mod channel;
mod run;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lake::LakeWriter;
use crate::media::MediaFetcher;
use crate::session::ChannelSession;
use crate::types::Event;

/// Main scraper instance (cloneable - all fields are Arc-wrapped or cheap)
#[derive(Clone)]
pub struct ChannelScraper {
    /// Session used for all provider traffic (trait object for pluggable transports)
    pub(crate) session: std::sync::Arc<dyn ChannelSession>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Media fetcher rooted at the configured media directory
    pub(crate) media: MediaFetcher,
    /// Lake writer rooted at the configured lake directory
    pub(crate) lake: LakeWriter,
    /// Cancellation token checked at every suspension point
    pub(crate) cancel: tokio_util::sync::CancellationToken,
}

impl ChannelScraper {
    /// Create a new ChannelScraper instance
    ///
    /// This validates the configuration, makes sure the lake and media
    /// roots exist, and sets up the event broadcast channel. The session
    /// is not connected here; [`scrape_all`](ChannelScraper::scrape_all)
    /// connects before any channel work.
    pub async fn new(config: Config, session: std::sync::Arc<dyn ChannelSession>) -> Result<Self> {
        config.validate()?;

        // Ensure lake and media directories exist
        tokio::fs::create_dir_all(&config.storage.lake_root)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create lake directory '{}': {}",
                        config.storage.lake_root.display(),
                        e
                    ),
                ))
            })?;
        tokio::fs::create_dir_all(&config.storage.media_root)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create media directory '{}': {}",
                        config.storage.media_root.display(),
                        e
                    ),
                ))
            })?;

        // Create broadcast channel with buffer size of 1000 events
        // This allows multiple subscribers to receive all events independently
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let media = MediaFetcher::new(config.storage.media_root.clone());
        let lake = LakeWriter::new(config.storage.lake_root.clone());

        Ok(Self {
            session,
            event_tx,
            config: std::sync::Arc::new(config),
            media,
            lake,
            cancel: tokio_util::sync::CancellationToken::new(),
        })
    }

    /// Subscribe to scrape events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use telegram_lake::{ChannelScraper, Config};
    /// # use telegram_lake::session::ChannelSession;
    /// # async fn example(session: Arc<dyn ChannelSession>) -> Result<(), Box<dyn std::error::Error>> {
    /// let scraper = ChannelScraper::new(Config::default(), session).await?;
    ///
    /// let mut events = scraper.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         tracing::info!(?event, "scrape event");
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    ///
    /// The configuration is wrapped in an Arc, so this is a cheap clone
    /// operation.
    pub fn get_config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config)
    }

    /// Request cancellation of the running scrape.
    ///
    /// Safe to call from any task. The scraper notices at its next
    /// suspension point, flushes partial work to the lake, and returns.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested, stopping at the next suspension point");
        self.cancel.cancel();
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped (ok() converts Err to None).
    /// This allows the scrape to continue even if no one is listening to events.
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }
}
