//! Raw-message normalization and validation
//!
//! Maps provider messages into the canonical [`ScrapedMessage`] shape.
//! Every message gets an explicit verdict: accepted with a record, or
//! rejected with a reason. Rejection is terminal for the message and is
//! never retried; it is not a transient-failure category.

use crate::session::{RawMedia, RawMessage};
use crate::types::{MediaType, MessageId, ScrapedMessage};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;

/// Why a message was excluded from the output sequence
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Text is empty or whitespace-only after trimming
    EmptyText,
    /// The record would violate a canonical-schema invariant
    SchemaViolation(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::EmptyText => write!(f, "empty or whitespace-only text"),
            RejectReason::SchemaViolation(what) => write!(f, "schema violation: {what}"),
        }
    }
}

/// Per-message normalization verdict
#[derive(Clone, Debug)]
pub enum Normalized {
    /// The message passed validation and content policy
    Accepted(ScrapedMessage),
    /// The message was dropped
    Rejected {
        /// Identifier of the dropped message
        message_id: MessageId,
        /// Why it was dropped
        reason: RejectReason,
    },
}

/// Strip the leading sigil from a channel name
pub fn normalize_channel_name(name: &str) -> String {
    name.trim_start_matches('@').to_string()
}

/// Derive the canonical media type from an attachment reference
pub fn media_type_of(media: Option<&RawMedia>) -> MediaType {
    match media {
        Some(RawMedia::Photo) => MediaType::Photo,
        Some(RawMedia::Document { .. }) => MediaType::Document,
        Some(RawMedia::Other { .. }) => MediaType::Other,
        None => MediaType::None,
    }
}

/// Map a raw message into the canonical record shape.
///
/// `media_path` is the fetcher's verdict for this message: a local path
/// when a download succeeded or an existing file was found, `None`
/// otherwise. The path is carried through untouched; a message whose media
/// failed to download still normalizes with `has_media == true`.
pub fn normalize(raw: &RawMessage, channel_name: &str, media_path: Option<PathBuf>) -> Normalized {
    let message_id = raw.id;

    let text = raw.text.as_deref().unwrap_or("");
    if text.trim().is_empty() {
        return Normalized::Rejected {
            message_id,
            reason: RejectReason::EmptyText,
        };
    }

    let record = ScrapedMessage {
        message_id,
        channel_name: normalize_channel_name(channel_name),
        message_text: text.to_string(),
        message_date: raw.date,
        has_media: raw.media.is_some(),
        media_type: media_type_of(raw.media.as_ref()),
        scraped_at: Utc::now(),
        raw_data: json!({
            "views": raw.views.unwrap_or(0),
            "forwards": raw.forwards.unwrap_or(0),
            "replies": raw.replies.unwrap_or(0),
            "grouped_id": raw.grouped_id,
        }),
        media_path,
    };

    if let Err(violation) = record.validate() {
        return Normalized::Rejected {
            message_id,
            reason: RejectReason::SchemaViolation(violation),
        };
    }

    Normalized::Accepted(record)
}
