//! Single-channel iteration: retry loop, pagination, media, and pacing.

use super::ChannelScraper;
use crate::error::SessionError;
use crate::media::MediaOutcome;
use crate::normalize::{self, Normalized};
use crate::pacing::MessagePacer;
use crate::retry::{BackoffSchedule, Classify, ErrorClass};
use crate::session::{ChannelHandle, RawMessage};
use crate::types::{ChannelFailure, ChannelOutcome, ChannelScrape, Event, MessageId, ScrapedMessage};
use std::time::Duration;

/// Mutable per-channel progress, kept across retry attempts so a resumed
/// attempt continues from the cursor instead of starting over.
struct ChannelState {
    channel: String,
    handle: Option<ChannelHandle>,
    offset: Option<MessageId>,
    records: Vec<ScrapedMessage>,
    rejected: u64,
    media_downloaded: u64,
}

impl ChannelState {
    fn new(channel: String) -> Self {
        Self {
            channel,
            handle: None,
            offset: None,
            records: Vec::new(),
            rejected: 0,
            media_downloaded: 0,
        }
    }

    /// Raw messages consumed so far, accepted or rejected
    fn consumed(&self) -> usize {
        self.records.len() + self.rejected as usize
    }

    fn into_scrape(self, outcome: ChannelOutcome) -> ChannelScrape {
        ChannelScrape {
            channel: self.channel,
            records: self.records,
            outcome,
            rejected: self.rejected,
            media_downloaded: self.media_downloaded,
        }
    }
}

/// How a single attempt ended short of success
enum AttemptError {
    Cancelled,
    Session(SessionError),
}

impl ChannelScraper {
    /// Scrape one channel to completion, cancellation, or abandonment.
    ///
    /// Never returns an error: every failure mode is folded into the
    /// returned [`ChannelScrape`] so one channel cannot take down a run.
    /// Records accepted before a retry or cancellation are kept.
    pub async fn scrape_channel(&self, channel: &str) -> ChannelScrape {
        let pacer = MessagePacer::new(&self.config.pacing);
        let mut schedule = BackoffSchedule::new(&self.config.retry);
        let mut state = ChannelState::new(normalize::normalize_channel_name(channel));

        loop {
            tracing::info!(
                channel = %state.channel,
                attempt = schedule.attempt(),
                "channel scrape attempt starting"
            );
            self.emit_event(Event::ChannelStarted {
                channel: state.channel.clone(),
                attempt: schedule.attempt(),
            });

            let error = match self.scrape_attempt(&mut state, &pacer).await {
                Ok(()) => {
                    tracing::info!(
                        channel = %state.channel,
                        records = state.records.len(),
                        rejected = state.rejected,
                        media = state.media_downloaded,
                        "channel scrape completed"
                    );
                    self.emit_event(Event::ChannelCompleted {
                        channel: state.channel.clone(),
                        records: state.records.len() as u64,
                        rejected: state.rejected,
                    });
                    return state.into_scrape(ChannelOutcome::Completed);
                }
                Err(AttemptError::Cancelled) => {
                    tracing::info!(channel = %state.channel, "channel scrape cancelled");
                    return state.into_scrape(ChannelOutcome::Cancelled);
                }
                Err(AttemptError::Session(error)) => error,
            };

            match error.classify() {
                ErrorClass::Private => return self.abandon(state, ChannelFailure::Private),
                ErrorClass::NotFound => return self.abandon(state, ChannelFailure::NotFound),
                ErrorClass::FloodWait(wait) => {
                    // Mandated cooldowns never count against the retry
                    // budget; the provider is throttling, not failing.
                    tracing::warn!(
                        channel = %state.channel,
                        seconds = wait.as_secs(),
                        "rate limited, honoring the mandated wait"
                    );
                    self.emit_event(Event::FloodWait {
                        channel: state.channel.clone(),
                        seconds: wait.as_secs(),
                    });
                    if !self.sleep_unless_cancelled(wait).await {
                        return state.into_scrape(ChannelOutcome::Cancelled);
                    }
                }
                ErrorClass::Transient => match schedule.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            channel = %state.channel,
                            error = %error,
                            failures = schedule.failures(),
                            delay_secs = delay.as_secs(),
                            "transient failure, backing off before the next attempt"
                        );
                        self.emit_event(Event::RetryScheduled {
                            channel: state.channel.clone(),
                            failures: schedule.failures(),
                            delay_secs: delay.as_secs(),
                        });
                        if !self.sleep_unless_cancelled(delay).await {
                            return state.into_scrape(ChannelOutcome::Cancelled);
                        }
                    }
                    None => {
                        return self.abandon(
                            state,
                            ChannelFailure::RetriesExhausted {
                                attempts: schedule.failures(),
                                last_error: error.to_string(),
                            },
                        );
                    }
                },
            }
        }
    }

    /// Run one attempt over the channel, resuming from the saved cursor.
    ///
    /// Returns `Ok(())` when the message limit is reached or history is
    /// exhausted. Session errors bubble up for classification; progress
    /// made before the error stays in `state`.
    async fn scrape_attempt(
        &self,
        state: &mut ChannelState,
        pacer: &MessagePacer,
    ) -> Result<(), AttemptError> {
        if self.cancel.is_cancelled() {
            return Err(AttemptError::Cancelled);
        }

        let handle = match &state.handle {
            Some(handle) => handle.clone(),
            None => {
                let resolved = tokio::select! {
                    () = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
                    resolved = self.session.resolve_channel(&state.channel) => {
                        resolved.map_err(AttemptError::Session)?
                    }
                };
                tracing::debug!(channel = %state.channel, id = resolved.id, "channel resolved");
                state.handle = Some(resolved.clone());
                resolved
            }
        };

        let limit = self.config.scrape.message_limit;
        let page_size = self.config.scrape.page_size;

        while state.consumed() < limit {
            let page = tokio::select! {
                () = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
                fetched = self.session.fetch_messages(&handle, state.offset, page_size) => {
                    fetched.map_err(AttemptError::Session)?
                }
            };
            if page.is_empty() {
                break;
            }
            let short_page = page.len() < page_size;

            for raw in &page {
                if state.consumed() >= limit {
                    break;
                }
                // The cursor advances over every yielded message so a
                // retried attempt never re-reads what this one consumed.
                state.offset = Some(raw.id);
                self.process_message(state, &handle, raw, pacer).await?;
            }

            if short_page {
                break;
            }
        }

        Ok(())
    }

    /// Run one message through media fetch and normalization.
    ///
    /// Media comes first so the record can carry its local path. Every
    /// message ends in exactly one of `state.records` or the rejected
    /// count; a media failure on its own never drops the message.
    async fn process_message(
        &self,
        state: &mut ChannelState,
        handle: &ChannelHandle,
        raw: &RawMessage,
        pacer: &MessagePacer,
    ) -> Result<(), AttemptError> {
        let media_outcome = if raw.media.is_some() {
            tokio::select! {
                () = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
                outcome = self.media.fetch(self.session.as_ref(), handle, raw) => outcome,
            }
        } else {
            MediaOutcome::Skipped
        };

        let media_path = match media_outcome {
            MediaOutcome::Downloaded(path) => {
                state.media_downloaded += 1;
                self.emit_event(Event::MediaDownloaded {
                    channel: state.channel.clone(),
                    message_id: raw.id,
                    path: path.clone(),
                });
                Some(path)
            }
            MediaOutcome::Existing(path) => Some(path),
            MediaOutcome::Failed(error) => {
                tracing::warn!(
                    channel = %state.channel,
                    message_id = %raw.id,
                    error = %error,
                    "media download failed, keeping the message without a file"
                );
                self.emit_event(Event::MediaFailed {
                    channel: state.channel.clone(),
                    message_id: raw.id,
                    error,
                });
                None
            }
            MediaOutcome::Skipped => None,
        };

        match normalize::normalize(raw, &state.channel, media_path) {
            Normalized::Accepted(record) => {
                state.records.push(record);
                tokio::select! {
                    () = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
                    () = pacer.tick() => {}
                }
            }
            Normalized::Rejected { message_id, reason } => {
                state.rejected += 1;
                tracing::debug!(
                    channel = %state.channel,
                    message_id = %message_id,
                    %reason,
                    "message rejected"
                );
            }
        }

        Ok(())
    }

    fn abandon(&self, state: ChannelState, failure: ChannelFailure) -> ChannelScrape {
        tracing::error!(channel = %state.channel, reason = %failure, "channel abandoned");
        self.emit_event(Event::ChannelFailed {
            channel: state.channel.clone(),
            reason: failure.to_string(),
        });
        state.into_scrape(ChannelOutcome::Failed(failure))
    }

    /// Sleep for `duration`, returning `false` when cancellation cut the
    /// sleep short.
    async fn sleep_unless_cancelled(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}
