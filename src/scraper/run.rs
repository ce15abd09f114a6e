//! Full-run orchestration across the configured channels.

use super::ChannelScraper;
use crate::error::Result;
use crate::types::{ChannelOutcome, ChannelScrape, ChannelSummary, Event, ScrapeReport};
use chrono::Utc;

impl ChannelScraper {
    /// Scrape every configured channel and flush the results to the lake.
    ///
    /// Channels are processed in configuration order. A failed channel is
    /// recorded in its summary and the run moves on; only configuration
    /// problems and the initial connection are fatal. Every attempted
    /// channel gets a lake file, including failed and cancelled ones, so
    /// partial data is never lost.
    pub async fn scrape_all(&self) -> Result<ScrapeReport> {
        let run_date = Utc::now().date_naive();

        tokio::select! {
            () = self.cancel.cancelled() => {
                tracing::info!("cancelled before the session connected");
                self.emit_event(Event::RunCancelled { channel: None });
                return Ok(ScrapeReport {
                    run_date,
                    channels: Vec::new(),
                    cancelled: true,
                });
            }
            result = self.session.connect() => result?,
        }

        tracing::info!(
            channels = self.config.telegram.channels.len(),
            %run_date,
            limit = self.config.scrape.message_limit,
            "scrape run starting"
        );

        let mut channels = Vec::with_capacity(self.config.telegram.channels.len());
        let mut cancelled = false;

        for name in &self.config.telegram.channels {
            if self.cancel.is_cancelled() {
                tracing::info!("cancelled between channels");
                self.emit_event(Event::RunCancelled { channel: None });
                cancelled = true;
                break;
            }

            let scrape = self.scrape_channel(name).await;

            // Whatever the outcome, accepted records are flushed. Partial
            // data beats lost data.
            let lake_file = match self
                .lake
                .write(&scrape.channel, run_date, &scrape.records)
                .await
            {
                Ok(path) => {
                    self.emit_event(Event::LakeFileWritten {
                        channel: scrape.channel.clone(),
                        path: path.clone(),
                        records: scrape.records.len() as u64,
                    });
                    Some(path)
                }
                Err(error) => {
                    tracing::error!(channel = %scrape.channel, %error, "lake write failed");
                    None
                }
            };

            let ChannelScrape {
                channel,
                records,
                outcome,
                rejected,
                media_downloaded,
            } = scrape;
            let was_cancelled = matches!(outcome, ChannelOutcome::Cancelled);

            channels.push(ChannelSummary {
                channel: channel.clone(),
                records: records.len() as u64,
                rejected,
                media_downloaded,
                outcome,
                lake_file,
            });

            if was_cancelled {
                self.emit_event(Event::RunCancelled {
                    channel: Some(channel),
                });
                cancelled = true;
                break;
            }
        }

        if let Err(error) = self.session.disconnect().await {
            tracing::warn!(%error, "session disconnect failed");
        }

        let report = ScrapeReport {
            run_date,
            channels,
            cancelled,
        };
        tracing::info!(
            channels = report.channels.len(),
            records = report.total_records(),
            cancelled = report.cancelled,
            "scrape run finished"
        );
        Ok(report)
    }
}
