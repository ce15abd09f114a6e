//! Date-partitioned JSON data lake
//!
//! One file per channel per run date, `{lake_root}/{YYYY-MM-DD}/{channel}.json`,
//! holding the full record array for that scrape. Files are written to a
//! temporary sibling and renamed into place, so readers never observe a
//! half-written file. A channel that produced no records still gets a file
//! with an empty array; the file's presence is the signal the channel was
//! attempted.

use crate::error::{Error, Result};
use crate::normalize::normalize_channel_name;
use crate::types::ScrapedMessage;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Writes per-channel record arrays into the lake tree
#[derive(Clone, Debug)]
pub struct LakeWriter {
    lake_root: PathBuf,
}

impl LakeWriter {
    /// Create a writer rooted at `lake_root`
    pub fn new(lake_root: impl Into<PathBuf>) -> Self {
        Self {
            lake_root: lake_root.into(),
        }
    }

    /// Root directory of the lake tree
    pub fn root(&self) -> &Path {
        &self.lake_root
    }

    /// Final path for a channel's records on a given run date
    pub fn lake_file_path(&self, run_date: NaiveDate, channel: &str) -> PathBuf {
        self.lake_root
            .join(run_date.format("%Y-%m-%d").to_string())
            .join(format!("{}.json", normalize_channel_name(channel)))
    }

    /// Persist a channel's records for `run_date`, replacing any earlier
    /// file for the same channel and date.
    pub async fn write(
        &self,
        channel: &str,
        run_date: NaiveDate,
        records: &[ScrapedMessage],
    ) -> Result<PathBuf> {
        let path = self.lake_file_path(run_date, channel);
        let day_dir = path
            .parent()
            .ok_or_else(|| Error::Lake(format!("lake path {} has no parent", path.display())))?;

        tokio::fs::create_dir_all(day_dir).await.map_err(|e| {
            Error::Lake(format!("failed to create {}: {e}", day_dir.display()))
        })?;

        let body = serde_json::to_vec_pretty(records)?;

        // Write-then-rename keeps partially written files out of the tree.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| Error::Lake(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Lake(format!("failed to move {} into place: {e}", tmp.display())))?;

        tracing::info!(
            channel,
            path = %path.display(),
            records = records.len(),
            "lake file written"
        );
        Ok(path)
    }
}
