//! Error types for telegram-lake
//!
//! This module provides error handling for the library, including:
//! - The crate-level [`Error`] type and [`Result`] alias
//! - [`SessionError`] for the protocol-session boundary, with variants the
//!   scrape loop can classify (flood wait, gone channel, transient fault)
//! - [`WarehouseError`] for the relational loading stage

use std::time::Duration;
use thiserror::Error;

/// Result type alias for telegram-lake operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for telegram-lake
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "telegram.api_id")
        key: Option<String>,
    },

    /// Protocol session operation failed
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Warehouse operation failed
    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    /// SQLx database error
    #[error("warehouse error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Lake file could not be read or parsed
    #[error("lake error: {0}")]
    Lake(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by a protocol session implementation
///
/// The scrape loop sorts these into three buckets (see [`crate::retry`]):
/// flood waits pause for the mandated duration without consuming the retry
/// budget, private and nonexistent channels fail the channel immediately,
/// and everything else is retried with escalating backoff.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Authentication with the remote service failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The channel exists but this session may not read it
    #[error("channel '{channel}' is private or inaccessible")]
    ChannelPrivate {
        /// Channel name that was being resolved
        channel: String,
    },

    /// No channel with this name exists
    #[error("channel '{channel}' does not exist")]
    ChannelNotFound {
        /// Channel name that was being resolved
        channel: String,
    },

    /// The remote mandated a cooldown before the next request
    #[error("rate limited: retry after {}s", .retry_after.as_secs())]
    FloodWait {
        /// How long the remote requires the client to wait
        retry_after: Duration,
    },

    /// Network-level failure (connection reset, timeout, DNS)
    #[error("network error: {0}")]
    Network(String),

    /// The remote returned something the session could not interpret
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The referenced media could not be retrieved
    #[error("media download failed: {0}")]
    MediaDownload(String),
}

/// Warehouse-related errors
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Failed to connect to the warehouse database
    #[error("failed to connect to warehouse: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}
