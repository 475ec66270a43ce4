//! Database module for SQLite persistence
//!
//! Holds the song metadata rows written at the end of an upload.

mod schema;
mod songs;

pub use schema::*;
pub use songs::*;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::Result;

/// Create a new database connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");

    let mut options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    if !in_memory {
        options = options
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
    }

    // Every connection to `:memory:` opens a separate database
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .connect_with(options)
        .await?;

    // Run migrations
    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Metadata insert failure
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct MetadataWriteError {
    pub reason: String,
}

impl From<sqlx::Error> for MetadataWriteError {
    fn from(e: sqlx::Error) -> Self {
        let reason = match &e {
            sqlx::Error::Database(db) => db.message().to_string(),
            other => other.to_string(),
        };
        Self { reason }
    }
}

/// Record store receiving one row per completed upload
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert_song(&self, record: &SongRecord) -> std::result::Result<SongId, MetadataWriteError>;
}

/// [`MetadataStore`] writing to the SQLite `songs` table
#[derive(Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert_song(&self, record: &SongRecord) -> std::result::Result<SongId, MetadataWriteError> {
        let id = SongRepository::new(&self.pool).insert(record).await?;
        tracing::debug!(table = SONGS_TABLE, song_id = id.0, "Inserted song row");
        Ok(id)
    }
}
