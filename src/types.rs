//! Core types and events for telegram-lake

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique message identifier, assigned by the source and stable forever.
///
/// Only unique within a channel; the natural key of a record is the pair
/// `(message_id, channel_name)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Create a new MessageId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<MessageId> for i64 {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for MessageId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<MessageId> for i64 {
    fn eq(&self, other: &MessageId) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for warehouse operations
impl sqlx::Type<sqlx::Sqlite> for MessageId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for MessageId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for MessageId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Kind of media attached to a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// Image attachment
    Photo,
    /// Generic file attachment
    Document,
    /// Any other attachment kind (webpage preview, poll, contact, ...)
    Other,
    /// No attachment
    None,
}

impl MediaType {
    /// Stable lowercase name used in serialized records and the warehouse
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Photo => "photo",
            MediaType::Document => "document",
            MediaType::Other => "other",
            MediaType::None => "none",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully normalized message record, ready for persistence
///
/// Constructed exclusively by the normalizer; every record entering the lake
/// has passed [`ScrapedMessage::validate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScrapedMessage {
    /// Source-assigned identifier, unique within the channel
    pub message_id: MessageId,

    /// Channel the message came from, without the leading sigil
    pub channel_name: String,

    /// Message body text (never empty; empty-text messages are rejected)
    pub message_text: String,

    /// Source-assigned timestamp; null when the source reports none
    pub message_date: Option<DateTime<Utc>>,

    /// Whether the message carried a media attachment
    pub has_media: bool,

    /// Kind of attachment (`none` when `has_media` is false)
    pub media_type: MediaType,

    /// When this record was normalized
    pub scraped_at: DateTime<Utc>,

    /// Auxiliary counters passed through uninterpreted
    /// (views, forwards, replies, grouped_id)
    pub raw_data: serde_json::Value,

    /// Local path of the downloaded media, present only when the download
    /// succeeded
    #[serde(default)]
    pub media_path: Option<PathBuf>,
}

impl ScrapedMessage {
    /// Check the invariants that gate persistence.
    ///
    /// Returns the name of the violated invariant on failure. Records built
    /// by the normalizer always pass; this exists so hand-built or re-read
    /// records can be checked before entering the warehouse.
    pub fn validate(&self) -> Result<(), String> {
        if self.message_id.get() <= 0 {
            return Err("message_id must be positive".into());
        }
        if self.channel_name.is_empty() {
            return Err("channel_name must not be empty".into());
        }
        if self.channel_name.starts_with('@') {
            return Err("channel_name must not carry a leading '@'".into());
        }
        if self.has_media != (self.media_type != MediaType::None) {
            return Err("has_media and media_type disagree".into());
        }
        if self.media_path.is_some() && !self.has_media {
            return Err("media_path requires has_media".into());
        }
        Ok(())
    }
}

/// Terminal state of a single channel scrape
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOutcome {
    /// Iteration finished without an unrecoverable error
    Completed,
    /// A stop signal arrived before the channel finished
    Cancelled,
    /// The channel was abandoned
    Failed(ChannelFailure),
}

/// Why a channel scrape was abandoned
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFailure {
    /// The channel is private or otherwise inaccessible to this session
    Private,
    /// The channel does not exist
    NotFound,
    /// Transient errors exhausted the retry budget
    RetriesExhausted {
        /// Total attempts made
        attempts: u32,
        /// The last error observed
        last_error: String,
    },
}

impl std::fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelFailure::Private => write!(f, "private or inaccessible"),
            ChannelFailure::NotFound => write!(f, "does not exist"),
            ChannelFailure::RetriesExhausted {
                attempts,
                last_error,
            } => {
                write!(
                    f,
                    "retries exhausted after {attempts} attempts: {last_error}"
                )
            }
        }
    }
}

/// Result of scraping one channel, including any partial records
///
/// Records survive every outcome: a failed or cancelled scrape still carries
/// whatever was accumulated before termination.
#[derive(Clone, Debug)]
pub struct ChannelScrape {
    /// Normalized channel name (no leading sigil)
    pub channel: String,

    /// Accepted records, in provider iteration order (newest first)
    pub records: Vec<ScrapedMessage>,

    /// How the scrape ended
    pub outcome: ChannelOutcome,

    /// Messages dropped by validation or content policy
    pub rejected: u64,

    /// Media files downloaded during this scrape
    pub media_downloaded: u64,
}

impl ChannelScrape {
    /// True when iteration ran to its natural end
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, ChannelOutcome::Completed)
    }
}

/// Per-channel entry in a [`ScrapeReport`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelSummary {
    /// Normalized channel name
    pub channel: String,

    /// Records written to the lake for this channel
    pub records: u64,

    /// Messages dropped by validation or content policy
    pub rejected: u64,

    /// Media files downloaded
    pub media_downloaded: u64,

    /// How the scrape ended
    pub outcome: ChannelOutcome,

    /// Lake file written for this channel, if the write succeeded
    pub lake_file: Option<PathBuf>,
}

/// Summary of a full run across the configured channels
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrapeReport {
    /// Date partition the run wrote into
    pub run_date: NaiveDate,

    /// Per-channel results, in configuration order
    pub channels: Vec<ChannelSummary>,

    /// Whether a stop signal cut the run short
    pub cancelled: bool,
}

impl ScrapeReport {
    /// Total records written across all channels
    pub fn total_records(&self) -> u64 {
        self.channels.iter().map(|c| c.records).sum()
    }
}

/// Events emitted by the scraper
///
/// Subscribe via `ChannelScraper::subscribe()`. Events are broadcast; a slow
/// consumer may observe a lagged receiver, so treat events as observability,
/// not as a durable log.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A scrape attempt for a channel began
    ChannelStarted {
        /// Channel name
        channel: String,
        /// Attempt number, starting at 1
        attempt: u32,
    },

    /// The remote mandated a cooldown; the scraper is waiting it out
    FloodWait {
        /// Channel name
        channel: String,
        /// Mandated wait in seconds
        seconds: u64,
    },

    /// A transient failure scheduled another attempt
    RetryScheduled {
        /// Channel name
        channel: String,
        /// Transient failures so far
        failures: u32,
        /// Backoff delay in seconds before the next attempt
        delay_secs: u64,
    },

    /// A channel scrape finished its iteration
    ChannelCompleted {
        /// Channel name
        channel: String,
        /// Accepted records
        records: u64,
        /// Rejected messages
        rejected: u64,
    },

    /// A channel was abandoned
    ChannelFailed {
        /// Channel name
        channel: String,
        /// Failure description
        reason: String,
    },

    /// A media file was downloaded
    MediaDownloaded {
        /// Channel name
        channel: String,
        /// Owning message
        message_id: MessageId,
        /// Path of the downloaded file
        path: PathBuf,
    },

    /// A media download failed; the record is kept without a path
    MediaFailed {
        /// Channel name
        channel: String,
        /// Owning message
        message_id: MessageId,
        /// Error description
        error: String,
    },

    /// A lake file was written
    LakeFileWritten {
        /// Channel name
        channel: String,
        /// Path of the written file
        path: PathBuf,
        /// Records in the file
        records: u64,
    },

    /// A stop signal was observed; partial work has been flushed
    RunCancelled {
        /// Channel that was in flight, if any
        channel: Option<String>,
    },
}
