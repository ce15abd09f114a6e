//! Lake-to-warehouse loading
//!
//! Walks the lake tree, parses every per-channel JSON file, and lands the
//! records in the warehouse. Two on-disk shapes are understood: the
//! canonical [`ScrapedMessage`] array the scraper writes today, and the
//! flat `{id, channel, text, date, image_url}` objects older exports
//! produced. Legacy records are lifted into the canonical shape with the
//! whole original object preserved in `raw_data`.
//!
//! Loading is idempotent: the warehouse skips rows it already holds, so
//! re-running the loader over the same tree inserts nothing new.

use crate::error::Result;
use crate::normalize::normalize_channel_name;
use crate::types::{MediaType, MessageId, ScrapedMessage};
use crate::warehouse::Warehouse;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Older export shape, one flat object per message
#[derive(Debug, Deserialize)]
struct LegacyRecord {
    #[serde(alias = "message_id")]
    id: i64,
    channel: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

/// Outcome of loading a single lake file
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoad {
    /// Records read from the file
    pub records: u64,
    /// Rows newly inserted into the warehouse
    pub inserted: u64,
    /// Records dropped as unparseable or empty
    pub skipped: u64,
}

/// Totals across a whole lake tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Files loaded
    pub files: u64,
    /// Files skipped because they could not be read or parsed
    pub failed_files: u64,
    /// Records read across all loaded files
    pub records: u64,
    /// Rows newly inserted into the warehouse
    pub inserted: u64,
    /// Records dropped as unparseable or empty
    pub skipped_records: u64,
}

/// Reads lake files into the warehouse
#[derive(Clone, Debug)]
pub struct LakeLoader {
    lake_root: PathBuf,
}

impl LakeLoader {
    /// Create a loader over the lake tree at `lake_root`
    pub fn new(lake_root: impl Into<PathBuf>) -> Self {
        Self {
            lake_root: lake_root.into(),
        }
    }

    /// Find every JSON file under the lake root, sorted by path
    pub fn discover_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.lake_root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::warn!(%error, "skipping unreadable lake entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    /// Load one lake file into the warehouse.
    ///
    /// Individual records that cannot be lifted into the canonical shape
    /// are counted and skipped; a file that cannot be read or parsed at
    /// all is an error for the caller to handle.
    pub async fn load_file(&self, warehouse: &Warehouse, path: &Path) -> Result<FileLoad> {
        let body = tokio::fs::read(path).await?;
        let values: Vec<serde_json::Value> = serde_json::from_slice(&body)?;
        let total = values.len() as u64;

        let mut keep = Vec::with_capacity(values.len());
        let mut skipped = 0u64;
        for value in values {
            match convert_record(value) {
                Some(record) => keep.push(record),
                None => skipped += 1,
            }
        }

        let inserted = warehouse.insert_messages(&keep).await?;
        tracing::info!(
            path = %path.display(),
            records = total,
            inserted,
            skipped,
            "lake file loaded"
        );
        Ok(FileLoad {
            records: total,
            inserted,
            skipped,
        })
    }

    /// Load every lake file into the warehouse.
    ///
    /// A file that fails to load is logged and counted; the rest of the
    /// tree is still processed.
    pub async fn load_all(&self, warehouse: &Warehouse) -> LoadStats {
        let files = self.discover_files();
        tracing::info!(
            count = files.len(),
            root = %self.lake_root.display(),
            "loading lake files"
        );

        let mut stats = LoadStats::default();
        for path in files {
            match self.load_file(warehouse, &path).await {
                Ok(load) => {
                    stats.files += 1;
                    stats.records += load.records;
                    stats.inserted += load.inserted;
                    stats.skipped_records += load.skipped;
                }
                Err(error) => {
                    tracing::error!(path = %path.display(), %error, "failed to load lake file");
                    stats.failed_files += 1;
                }
            }
        }

        tracing::info!(
            files = stats.files,
            failed = stats.failed_files,
            records = stats.records,
            inserted = stats.inserted,
            "lake load finished"
        );
        stats
    }
}

/// Lift one lake value into the canonical record shape.
///
/// Canonical records pass through as-is. Legacy records are rebuilt
/// around the fields they do have, with the whole original object kept
/// in `raw_data`. Returns `None` for values in neither shape, for blank
/// legacy text, and for records that fail structural validation.
fn convert_record(value: serde_json::Value) -> Option<ScrapedMessage> {
    if let Ok(record) = serde_json::from_value::<ScrapedMessage>(value.clone()) {
        return Some(record);
    }

    let legacy = match serde_json::from_value::<LegacyRecord>(value.clone()) {
        Ok(legacy) => legacy,
        Err(error) => {
            tracing::debug!(%error, "record matches neither lake shape, skipping");
            return None;
        }
    };

    let text = legacy.text.as_deref().unwrap_or("").trim().to_string();
    if text.is_empty() {
        tracing::debug!(id = legacy.id, "legacy record has no text, skipping");
        return None;
    }
    let has_image = legacy.image_url.is_some();

    let record = ScrapedMessage {
        message_id: MessageId(legacy.id),
        channel_name: normalize_channel_name(&legacy.channel),
        message_text: text,
        message_date: legacy.date.as_deref().and_then(parse_legacy_date),
        has_media: has_image,
        media_type: if has_image {
            MediaType::Photo
        } else {
            MediaType::None
        },
        scraped_at: Utc::now(),
        raw_data: value,
        media_path: None,
    };

    match record.validate() {
        Ok(()) => Some(record),
        Err(violation) => {
            tracing::debug!(id = legacy.id, violation, "legacy record is invalid, skipping");
            None
        }
    }
}

/// Best-effort parse of the date strings found in older exports.
///
/// Dates are never fabricated; a string in none of the known formats
/// loads as a dateless record.
fn parse_legacy_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    async fn open_warehouse(dir: &tempfile::TempDir) -> Warehouse {
        Warehouse::new(&dir.path().join("warehouse.db"))
            .await
            .unwrap()
    }

    fn write_lake_file(root: &Path, rel: &str, body: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    fn canonical_json(id: i64, channel: &str) -> serde_json::Value {
        json!({
            "message_id": id,
            "channel_name": channel,
            "message_text": format!("message {id}"),
            "message_date": "2024-03-05T09:00:00Z",
            "has_media": false,
            "media_type": "none",
            "scraped_at": "2024-03-05T10:00:00Z",
            "raw_data": {"views": 3}
        })
    }

    #[test]
    fn discovers_json_files_sorted_and_ignores_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        write_lake_file(dir.path(), "2024-03-05/beta.json", "[]");
        write_lake_file(dir.path(), "2024-03-04/alpha.json", "[]");
        write_lake_file(dir.path(), "2024-03-05/notes.txt", "not a lake file");

        let loader = LakeLoader::new(dir.path());
        let files = loader.discover_files();

        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("2024-03-04/alpha.json"));
        assert!(files[1].ends_with("2024-03-05/beta.json"));
    }

    #[tokio::test]
    async fn loads_canonical_records() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = open_warehouse(&dir).await;
        let body = serde_json::to_string(&vec![
            canonical_json(2, "alpha"),
            canonical_json(1, "alpha"),
        ])
        .unwrap();
        let path = write_lake_file(dir.path(), "lake/2024-03-05/alpha.json", &body);

        let loader = LakeLoader::new(dir.path().join("lake"));
        let load = loader.load_file(&warehouse, &path).await.unwrap();

        assert_eq!(load.records, 2);
        assert_eq!(load.inserted, 2);
        assert_eq!(load.skipped, 0);
        assert_eq!(warehouse.message_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn lifts_legacy_records_into_the_canonical_shape() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = open_warehouse(&dir).await;
        let body = json!([
            {
                "id": 101,
                "channel": "@lobelia4cosmetics",
                "sender": "someone",
                "text": "new arrivals in stock",
                "date": "2021-07-13 18:55:17+00:00",
                "image_url": "https://example.com/photo.jpg"
            },
            {
                "message_id": 102,
                "channel": "lobelia4cosmetics",
                "text": "price list attached",
                "date": "not a date"
            }
        ])
        .to_string();
        let path = write_lake_file(dir.path(), "lake/old/dump.json", &body);

        let loader = LakeLoader::new(dir.path().join("lake"));
        let load = loader.load_file(&warehouse, &path).await.unwrap();
        assert_eq!(load.inserted, 2);

        let rows = warehouse
            .messages_for_channel("lobelia4cosmetics")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let with_image = &rows[1];
        assert_eq!(with_image.message_id, MessageId(101));
        assert!(with_image.has_media, "image_url implies media");
        assert_eq!(with_image.media_type, "photo");
        assert_eq!(
            with_image.message_date.as_deref(),
            Some("2021-07-13T18:55:17+00:00")
        );
        assert!(
            with_image.raw_data.as_deref().unwrap().contains("image_url"),
            "the whole legacy object is preserved"
        );

        let dateless = &rows[0];
        assert_eq!(dateless.message_id, MessageId(102));
        assert!(
            dateless.message_date.is_none(),
            "unparseable dates load as dateless"
        );
    }

    #[tokio::test]
    async fn skips_bad_records_and_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = open_warehouse(&dir).await;
        let body = json!([
            canonical_json(1, "alpha"),
            {"id": 5, "channel": "alpha", "text": "   "},
            {"unrelated": true},
            {"id": 6, "channel": "alpha", "text": "kept"}
        ])
        .to_string();
        let path = write_lake_file(dir.path(), "lake/mixed.json", &body);

        let loader = LakeLoader::new(dir.path().join("lake"));
        let load = loader.load_file(&warehouse, &path).await.unwrap();

        assert_eq!(load.records, 4);
        assert_eq!(load.inserted, 2);
        assert_eq!(load.skipped, 2);
    }

    #[tokio::test]
    async fn load_all_contains_file_failures() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = open_warehouse(&dir).await;
        let lake = dir.path().join("lake");
        write_lake_file(
            &lake,
            "2024-03-05/alpha.json",
            &serde_json::to_string(&vec![canonical_json(1, "alpha")]).unwrap(),
        );
        write_lake_file(&lake, "2024-03-05/broken.json", "{ this is not json");

        let loader = LakeLoader::new(&lake);
        let stats = loader.load_all(&warehouse).await;

        assert_eq!(stats.files, 1);
        assert_eq!(stats.failed_files, 1);
        assert_eq!(stats.inserted, 1);
        assert_eq!(warehouse.message_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reloading_the_tree_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = open_warehouse(&dir).await;
        let lake = dir.path().join("lake");
        write_lake_file(
            &lake,
            "2024-03-05/alpha.json",
            &serde_json::to_string(&vec![canonical_json(1, "alpha"), canonical_json(2, "alpha")])
                .unwrap(),
        );

        let loader = LakeLoader::new(&lake);
        let first = loader.load_all(&warehouse).await;
        let second = loader.load_all(&warehouse).await;

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.records, 2);
        assert_eq!(warehouse.message_count().await.unwrap(), 2);
    }

    #[test]
    fn legacy_dates_parse_across_known_formats() {
        let expected = Utc.with_ymd_and_hms(2021, 7, 13, 18, 55, 17).unwrap();
        assert_eq!(parse_legacy_date("2021-07-13T18:55:17+00:00"), Some(expected));
        assert_eq!(parse_legacy_date("2021-07-13 18:55:17+00:00"), Some(expected));
        assert_eq!(parse_legacy_date("2021-07-13 18:55:17"), Some(expected));
        assert_eq!(parse_legacy_date("July 13th"), None);
    }
}
