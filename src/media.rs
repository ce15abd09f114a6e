//! Media download with deterministic paths and existence short-circuit
//!
//! Media files land under `{media_root}/{channel}/{YYYY-MM-DD}/` with a
//! `{message_id}_{unix_ts}.{ext}` filename, so a file's provenance is
//! recoverable from its path alone. Downloads are strictly best-effort:
//! a failed fetch is reported back to the caller but never fails the
//! message or the channel.

use crate::normalize::normalize_channel_name;
use crate::session::{ChannelHandle, ChannelSession, RawMedia, RawMessage};
use std::path::{Path, PathBuf};

/// Result of one media-fetch attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaOutcome {
    /// Nothing to download for this message
    Skipped,
    /// File already on disk from an earlier run; no download performed
    Existing(PathBuf),
    /// Fetched in this run
    Downloaded(PathBuf),
    /// Download attempted and failed; the message is still kept
    Failed(String),
}

impl MediaOutcome {
    /// Local path to hand to the record, when one exists
    pub fn path(&self) -> Option<&Path> {
        match self {
            MediaOutcome::Existing(path) | MediaOutcome::Downloaded(path) => Some(path),
            MediaOutcome::Skipped | MediaOutcome::Failed(_) => None,
        }
    }
}

/// File extension for a downloadable attachment, `None` for kinds that
/// are recorded but never fetched
pub fn extension_for(media: &RawMedia) -> Option<&'static str> {
    match media {
        RawMedia::Photo => Some("jpg"),
        RawMedia::Document { mime_type } => Some(match mime_type.as_deref() {
            Some("image/jpeg") => "jpg",
            Some("image/png") => "png",
            Some(mime) if mime.starts_with("video/") => "mp4",
            _ => "bin",
        }),
        RawMedia::Other { .. } => None,
    }
}

/// Downloads message attachments into the media tree
#[derive(Clone, Debug)]
pub struct MediaFetcher {
    media_root: PathBuf,
}

impl MediaFetcher {
    /// Create a fetcher rooted at `media_root`
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    /// Destination path for a message's attachment, `None` when the
    /// message has no downloadable media.
    ///
    /// Dateless messages fall into an `unknown/` day directory with a
    /// zero timestamp in the filename.
    pub fn media_path_for(&self, channel: &str, message: &RawMessage) -> Option<PathBuf> {
        let media = message.media.as_ref()?;
        let ext = extension_for(media)?;

        let (day_dir, unix_ts) = match message.date {
            Some(date) => (date.format("%Y-%m-%d").to_string(), date.timestamp()),
            None => ("unknown".to_string(), 0),
        };

        Some(
            self.media_root
                .join(normalize_channel_name(channel))
                .join(day_dir)
                .join(format!("{}_{}.{}", message.id, unix_ts, ext)),
        )
    }

    /// Fetch the attachment for one message.
    ///
    /// Checks for an already-downloaded file first and reuses it without
    /// touching the session. Errors are folded into the returned outcome;
    /// this never propagates.
    pub async fn fetch(
        &self,
        session: &dyn ChannelSession,
        channel: &ChannelHandle,
        message: &RawMessage,
    ) -> MediaOutcome {
        let Some(dest) = self.media_path_for(&channel.name, message) else {
            return MediaOutcome::Skipped;
        };

        match tokio::fs::try_exists(&dest).await {
            Ok(true) => {
                tracing::debug!(path = %dest.display(), "media already present, skipping download");
                return MediaOutcome::Existing(dest);
            }
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(%error, path = %dest.display(), "media existence check failed, attempting download");
            }
        }

        if let Some(parent) = dest.parent() {
            if let Err(error) = tokio::fs::create_dir_all(parent).await {
                return MediaOutcome::Failed(format!(
                    "failed to create {}: {error}",
                    parent.display()
                ));
            }
        }

        match session.download_media(channel, message, &dest).await {
            Ok(()) => MediaOutcome::Downloaded(dest),
            Err(error) => MediaOutcome::Failed(error.to_string()),
        }
    }
}
