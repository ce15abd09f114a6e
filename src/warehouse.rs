//! SQLite warehouse for scraped messages
//!
//! The loading stage lands lake records here. Rows are keyed by
//! `(message_id, channel_name)`; message ids are only unique within a
//! channel, so the composite key is what makes re-loading the same lake
//! files a no-op. Image detection results from downstream enrichment
//! join back onto messages through the same composite key.

use crate::error::{Error, Result, WarehouseError};
use crate::types::{MessageId, ScrapedMessage};
use sqlx::sqlite::SqlitePool;
use sqlx::{FromRow, SqliteConnection};
use std::path::Path;
use std::path::PathBuf;

/// New image detection to be inserted into the warehouse
#[derive(Debug, Clone)]
pub struct NewDetection {
    /// Message that owns the analyzed image
    pub message_id: MessageId,
    /// Channel the message belongs to
    pub channel_name: String,
    /// Path of the analyzed image
    pub image_path: PathBuf,
    /// Class label produced by the detector
    pub detected_class: String,
    /// Detector confidence in the label, 0.0 through 1.0
    pub confidence: f64,
}

/// Message record from the warehouse
#[derive(Debug, Clone, FromRow)]
pub struct StoredMessage {
    /// Source-assigned message identifier
    pub message_id: MessageId,
    /// Normalized channel name
    pub channel_name: String,
    /// Message text
    pub message_text: String,
    /// Publication timestamp as RFC 3339 text, when the source provided one
    pub message_date: Option<String>,
    /// Whether the message carried an attachment
    pub has_media: bool,
    /// Attachment kind label
    pub media_type: String,
    /// When the record was scraped, RFC 3339 text
    pub scraped_at: String,
    /// Source payload extras as JSON text
    pub raw_data: Option<String>,
    /// Local path of the downloaded attachment, if any
    pub media_path: Option<String>,
}

/// Warehouse handle over a SQLite database
pub struct Warehouse {
    pool: SqlitePool,
}

impl Warehouse {
    /// Open or create the warehouse database
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Warehouse(WarehouseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        // Connect with foreign key enforcement and WAL mode
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Warehouse(WarehouseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Warehouse(WarehouseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let warehouse = Self { pool };
        warehouse.run_migrations().await?;
        Ok(warehouse)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Warehouse(WarehouseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        // Create schema version table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Warehouse(WarehouseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        // Check current version
        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Warehouse(WarehouseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?;

        let current_version = current_version.unwrap_or(0);

        // Apply migrations
        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }
        if current_version < 2 {
            Self::migrate_v2(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: Create the messages table
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying warehouse migration v1");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Warehouse(WarehouseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            sqlx::query(
                r#"
                CREATE TABLE messages (
                    message_id INTEGER NOT NULL,
                    channel_name TEXT NOT NULL,
                    message_text TEXT NOT NULL,
                    message_date TEXT,
                    has_media INTEGER NOT NULL DEFAULT 0,
                    media_type TEXT NOT NULL DEFAULT 'none',
                    scraped_at TEXT NOT NULL,
                    raw_data TEXT,
                    media_path TEXT,
                    PRIMARY KEY (message_id, channel_name)
                )
                "#,
            )
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Warehouse(WarehouseError::MigrationFailed(format!(
                    "Failed to create messages table: {}",
                    e
                )))
            })?;

            sqlx::query("CREATE INDEX idx_messages_channel ON messages(channel_name)")
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Warehouse(WarehouseError::MigrationFailed(format!(
                        "Failed to create index: {}",
                        e
                    )))
                })?;

            sqlx::query("CREATE INDEX idx_messages_date ON messages(message_date)")
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Warehouse(WarehouseError::MigrationFailed(format!(
                        "Failed to create index: {}",
                        e
                    )))
                })?;

            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Warehouse(WarehouseError::MigrationFailed(format!(
                            "Failed to commit migration v1: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Warehouse migration v1 complete");
        Ok(())
    }

    /// Migration v2: Add the image_detections table for enrichment results
    async fn migrate_v2(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying warehouse migration v2");

        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Warehouse(WarehouseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS image_detections (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    message_id INTEGER NOT NULL,
                    channel_name TEXT NOT NULL,
                    image_path TEXT NOT NULL,
                    detected_class TEXT NOT NULL,
                    confidence REAL NOT NULL,
                    detected_at TEXT NOT NULL
                )
                "#,
            )
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Warehouse(WarehouseError::MigrationFailed(format!(
                    "Failed to create image_detections table: {}",
                    e
                )))
            })?;

            sqlx::query(
                "CREATE INDEX idx_detections_message ON image_detections(message_id, channel_name)",
            )
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Warehouse(WarehouseError::MigrationFailed(format!(
                    "Failed to create index: {}",
                    e
                )))
            })?;

            Self::record_migration(conn, 2).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Warehouse(WarehouseError::MigrationFailed(format!(
                            "Failed to commit migration v2: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Warehouse migration v2 complete");
        Ok(())
    }

    /// Record a migration version
    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Warehouse(WarehouseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Insert a batch of records, skipping rows that are already present.
    ///
    /// Returns the number of rows actually inserted. Rows that collide on
    /// `(message_id, channel_name)` are left untouched, which is what
    /// makes loading the same lake file twice a no-op.
    pub async fn insert_messages(&self, records: &[ScrapedMessage]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO messages (
                    message_id, channel_name, message_text, message_date,
                    has_media, media_type, scraped_at, raw_data, media_path
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(message_id, channel_name) DO NOTHING
                "#,
            )
            .bind(record.message_id)
            .bind(&record.channel_name)
            .bind(&record.message_text)
            .bind(record.message_date.map(|d| d.to_rfc3339()))
            .bind(record.has_media)
            .bind(record.media_type.as_str())
            .bind(record.scraped_at.to_rfc3339())
            .bind(serde_json::to_string(&record.raw_data)?)
            .bind(record.media_path.as_ref().map(|p| p.display().to_string()))
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Fetch all stored messages for a channel, newest id first
    pub async fn messages_for_channel(&self, channel: &str) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, StoredMessage>(
            r#"
            SELECT message_id, channel_name, message_text, message_date,
                   has_media, media_type, scraped_at, raw_data, media_path
            FROM messages
            WHERE channel_name = ?
            ORDER BY message_id DESC
            "#,
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Total number of stored messages
    pub async fn message_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Record a batch of image detection results
    pub async fn record_detections(&self, detections: &[NewDetection]) -> Result<()> {
        let detected_at = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for detection in detections {
            sqlx::query(
                r#"
                INSERT INTO image_detections (
                    message_id, channel_name, image_path,
                    detected_class, confidence, detected_at
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(detection.message_id)
            .bind(&detection.channel_name)
            .bind(detection.image_path.display().to_string())
            .bind(&detection.detected_class)
            .bind(detection.confidence)
            .bind(&detected_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Total number of stored detections
    pub async fn detection_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM image_detections")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Extract the owning message id from a media filename.
///
/// Media filenames are `{message_id}_{unix_ts}.{ext}`, so enrichment
/// jobs that walk the media tree can join their results back onto the
/// `messages` table without a lookup pass.
pub fn message_id_from_media_filename(path: &Path) -> Option<MessageId> {
    let stem = path.file_stem()?.to_str()?;
    let (id, _) = stem.split_once('_')?;
    id.parse::<i64>().ok().filter(|id| *id > 0).map(MessageId)
}
