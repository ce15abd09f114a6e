//! Common test utilities: a scripted session and config/message builders.
//!
//! `StubSession` plays back per-channel histories the way a real
//! transport would, with scripted failures injected per fetch call. All
//! call counts are observable so tests can assert on traffic, not just
//! outcomes.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use telegram_lake::session::{ChannelHandle, ChannelSession, RawMedia, RawMessage};
use telegram_lake::{Config, Event, MessageId, SessionError};

/// Fixed message date used by every builder, 2024-03-05 12:00:00 UTC.
///
/// Unix timestamp 1709640000; media filenames built from these messages
/// end in `_1709640000`.
pub fn stub_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
}

/// Plain text message with engagement counters filled in
pub fn text_message(id: i64, text: &str) -> RawMessage {
    RawMessage {
        id: MessageId(id),
        text: Some(text.to_string()),
        date: Some(stub_date()),
        media: None,
        views: Some(100),
        forwards: Some(2),
        replies: Some(0),
        grouped_id: None,
    }
}

/// Text message carrying a photo attachment
pub fn photo_message(id: i64, text: &str) -> RawMessage {
    RawMessage {
        media: Some(RawMedia::Photo),
        ..text_message(id, text)
    }
}

/// Message with whitespace-only text, rejected by normalization
pub fn blank_message(id: i64) -> RawMessage {
    text_message(id, "   ")
}

/// `count` text messages with descending ids starting at `newest_id`
pub fn text_history(newest_id: i64, count: usize) -> Vec<RawMessage> {
    (0..count as i64)
        .map(|i| text_message(newest_id - i, &format!("message {}", newest_id - i)))
        .collect()
}

/// Config pointed at temp storage, tuned for fast tests.
///
/// Pacing is off and backoff is short; tests that exercise those knobs
/// turn them back up explicitly.
pub fn test_config(temp: &tempfile::TempDir, channels: &[&str]) -> Config {
    let mut config = Config::default();
    config.telegram.channels = channels.iter().map(|c| c.to_string()).collect();
    config.storage.lake_root = temp.path().join("lake");
    config.storage.media_root = temp.path().join("media");
    config.scrape.page_size = 5;
    config.retry.backoff_base = Duration::from_millis(20);
    config.pacing.batch_size = 0;
    config
}

/// Pull everything currently buffered on an event receiver
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Scripted in-memory session
pub struct StubSession {
    histories: HashMap<String, Vec<RawMessage>>,
    fetch_plans: Mutex<HashMap<String, VecDeque<Result<(), SessionError>>>>,
    resolve_errors: Mutex<HashMap<String, VecDeque<SessionError>>>,
    connect_errors: Mutex<VecDeque<SessionError>>,
    failing_downloads: HashSet<i64>,
    /// connect() calls observed
    pub connect_calls: AtomicU32,
    /// resolve_channel() calls observed
    pub resolve_calls: AtomicU32,
    /// fetch_messages() calls observed
    pub fetch_calls: AtomicU32,
    /// download_media() calls observed
    pub download_calls: AtomicU32,
    /// disconnect() calls observed
    pub disconnect_calls: AtomicU32,
}

impl StubSession {
    pub fn builder() -> StubSessionBuilder {
        StubSessionBuilder::default()
    }

    pub fn fetches(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> u32 {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn resolves(&self) -> u32 {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

/// Builder for [`StubSession`]
#[derive(Default)]
pub struct StubSessionBuilder {
    histories: HashMap<String, Vec<RawMessage>>,
    fetch_plans: HashMap<String, VecDeque<Result<(), SessionError>>>,
    resolve_errors: HashMap<String, VecDeque<SessionError>>,
    connect_errors: VecDeque<SessionError>,
    failing_downloads: HashSet<i64>,
}

impl StubSessionBuilder {
    /// Register a channel with its full history, newest first
    pub fn channel(mut self, name: &str, history: Vec<RawMessage>) -> Self {
        self.histories.insert(name.to_string(), history);
        self
    }

    /// Script the outcome of successive fetch calls for a channel.
    ///
    /// Each call pops one step: `Err` is returned to the scraper, `Ok`
    /// serves a page normally. Once the plan runs dry all further calls
    /// serve pages normally.
    pub fn fetch_plan(mut self, channel: &str, steps: Vec<Result<(), SessionError>>) -> Self {
        self.fetch_plans.insert(channel.to_string(), steps.into());
        self
    }

    /// Make the next resolve call for a channel fail
    pub fn resolve_error(mut self, channel: &str, error: SessionError) -> Self {
        self.resolve_errors
            .entry(channel.to_string())
            .or_default()
            .push_back(error);
        self
    }

    /// Make the next connect call fail
    pub fn connect_error(mut self, error: SessionError) -> Self {
        self.connect_errors.push_back(error);
        self
    }

    /// Make downloads for this message id fail
    pub fn fail_download(mut self, message_id: i64) -> Self {
        self.failing_downloads.insert(message_id);
        self
    }

    pub fn build(self) -> std::sync::Arc<StubSession> {
        std::sync::Arc::new(StubSession {
            histories: self.histories,
            fetch_plans: Mutex::new(self.fetch_plans),
            resolve_errors: Mutex::new(self.resolve_errors),
            connect_errors: Mutex::new(self.connect_errors),
            failing_downloads: self.failing_downloads,
            connect_calls: AtomicU32::new(0),
            resolve_calls: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
            download_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ChannelSession for StubSession {
    async fn connect(&self) -> Result<(), SessionError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.connect_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(())
    }

    async fn resolve_channel(&self, name: &str) -> Result<ChannelHandle, SessionError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self
            .resolve_errors
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }
        Ok(ChannelHandle {
            id: 1000 + name.len() as i64,
            name: name.to_string(),
            title: Some(format!("{name} channel")),
        })
    }

    async fn fetch_messages(
        &self,
        channel: &ChannelHandle,
        offset_id: Option<MessageId>,
        page_size: usize,
    ) -> Result<Vec<RawMessage>, SessionError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(step) = self
            .fetch_plans
            .lock()
            .unwrap()
            .get_mut(&channel.name)
            .and_then(|queue| queue.pop_front())
        {
            step?;
        }

        let Some(history) = self.histories.get(&channel.name) else {
            return Ok(Vec::new());
        };
        let start = match offset_id {
            Some(offset) => history
                .iter()
                .position(|m| m.id == offset)
                .map(|i| i + 1)
                .unwrap_or(history.len()),
            None => 0,
        };
        Ok(history.iter().skip(start).take(page_size).cloned().collect())
    }

    async fn download_media(
        &self,
        _channel: &ChannelHandle,
        message: &RawMessage,
        dest: &Path,
    ) -> Result<(), SessionError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_downloads.contains(&message.id.0) {
            return Err(SessionError::MediaDownload(
                "simulated transfer failure".into(),
            ));
        }
        tokio::fs::write(dest, b"stub-media-bytes")
            .await
            .map_err(|e| SessionError::MediaDownload(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
