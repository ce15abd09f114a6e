//! Protocol session boundary
//!
//! The scraper consumes the remote messaging service through the
//! [`ChannelSession`] trait rather than a concrete client, so the retry and
//! normalization machinery can be exercised against stub sessions in tests
//! and bound to a real MTProto client by the embedder.

use crate::error::SessionError;
use crate::types::MessageId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Resolved handle for a channel, obtained by name lookup
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelHandle {
    /// Provider-side identifier of the channel
    pub id: i64,

    /// Normalized channel name (no leading sigil)
    pub name: String,

    /// Human-readable title, when the provider reports one
    pub title: Option<String>,
}

/// Media attachment reference on a raw message
#[derive(Clone, Debug, PartialEq)]
pub enum RawMedia {
    /// Image attachment
    Photo,
    /// Generic file attachment with its declared content type
    Document {
        /// Declared MIME type, e.g. "image/jpeg"
        mime_type: Option<String>,
    },
    /// Any other attachment kind; the label only appears in logs
    Other {
        /// Provider-side kind label (e.g. "webpage", "poll")
        kind: String,
    },
}

/// A message as yielded by the provider's history iterator
#[derive(Clone, Debug)]
pub struct RawMessage {
    /// Source-assigned identifier
    pub id: MessageId,

    /// Message text; `None` when the message carries no text at all
    pub text: Option<String>,

    /// Source-assigned timestamp; `None` when the provider reports none
    pub date: Option<DateTime<Utc>>,

    /// Attachment reference, when present
    pub media: Option<RawMedia>,

    /// View count
    pub views: Option<i64>,

    /// Forward count
    pub forwards: Option<i64>,

    /// Reply count
    pub replies: Option<i64>,

    /// Album identifier when the message belongs to a media group
    pub grouped_id: Option<i64>,
}

/// Authenticated connection to the remote messaging service
///
/// One session is exclusively owned by one scraper at a time; the scraper
/// never iterates two channels over the same session concurrently.
#[async_trait]
pub trait ChannelSession: Send + Sync {
    /// Authenticate and open the underlying connection.
    ///
    /// Called once per run before any channel work. Implementations should
    /// make repeated calls cheap; already-connected is not an error.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Resolve a channel name into a handle.
    ///
    /// `name` may carry a leading `@`. Fails with
    /// [`SessionError::ChannelNotFound`] when no such channel exists and
    /// [`SessionError::ChannelPrivate`] when it exists but cannot be read
    /// by this session.
    async fn resolve_channel(&self, name: &str) -> Result<ChannelHandle, SessionError>;

    /// Fetch the next page of channel history, newest first.
    ///
    /// Returns up to `page_size` messages strictly older than `offset_id`
    /// (from the latest message when `offset_id` is `None`), ordered newest
    /// to oldest. A short or empty page means iteration reached the start
    /// of the channel.
    async fn fetch_messages(
        &self,
        channel: &ChannelHandle,
        offset_id: Option<MessageId>,
        page_size: usize,
    ) -> Result<Vec<RawMessage>, SessionError>;

    /// Download the media attached to `message` into `dest`.
    ///
    /// The parent directory of `dest` exists when this is called. On
    /// failure the file at `dest` must not be left behind half-written.
    async fn download_media(
        &self,
        channel: &ChannelHandle,
        message: &RawMessage,
        dest: &Path,
    ) -> Result<(), SessionError>;

    /// Close the underlying connection.
    ///
    /// Best-effort; the caller logs failures and does not retry.
    async fn disconnect(&self) -> Result<(), SessionError>;
}
