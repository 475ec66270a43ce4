//! Song database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::session::PrincipalId;
use crate::storage::StoredObjectRef;

/// Row id of a persisted song
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(pub i64);

/// Song row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub author: String,
    pub image_path: String,
    pub song_path: String,
    pub created_at: String,
}

/// Song row about to be inserted
///
/// Paths can only come from [`StoredObjectRef`]s handed back by a blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongRecord {
    user_id: String,
    title: String,
    author: String,
    image_path: String,
    song_path: String,
}

impl SongRecord {
    pub fn new(
        user: &PrincipalId,
        title: impl Into<String>,
        author: impl Into<String>,
        image: StoredObjectRef,
        song: StoredObjectRef,
    ) -> Self {
        Self {
            user_id: user.as_str().to_string(),
            title: title.into(),
            author: author.into(),
            image_path: image.path,
            song_path: song.path,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn image_path(&self) -> &str {
        &self.image_path
    }

    pub fn song_path(&self) -> &str {
        &self.song_path
    }
}

/// Song repository
pub struct SongRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SongRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a song, returning its id
    pub async fn insert(&self, record: &SongRecord) -> std::result::Result<SongId, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO songs (user_id, title, author, image_path, song_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.title)
        .bind(&record.author)
        .bind(&record.image_path)
        .bind(&record.song_path)
        .bind(&now)
        .execute(self.pool)
        .await?;

        Ok(SongId(result.last_insert_rowid()))
    }

    /// Get a specific song
    pub async fn get(&self, id: SongId) -> Result<Option<Song>> {
        let song = sqlx::query_as::<_, Song>(
            r#"
            SELECT id, user_id, title, author, image_path, song_path, created_at
            FROM songs
            WHERE id = ?
            "#,
        )
        .bind(id.0)
        .fetch_optional(self.pool)
        .await?;

        Ok(song)
    }

    /// List songs uploaded by a user, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Song>> {
        let songs = sqlx::query_as::<_, Song>(
            r#"
            SELECT id, user_id, title, author, image_path, song_path, created_at
            FROM songs
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(songs)
    }

    /// List all songs, newest first
    pub async fn list(&self) -> Result<Vec<Song>> {
        let songs = sqlx::query_as::<_, Song>(
            r#"
            SELECT id, user_id, title, author, image_path, song_path, created_at
            FROM songs
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(songs)
    }

    /// Search songs by title substring (case-insensitive for ASCII)
    pub async fn search_by_title(&self, query: &str) -> Result<Vec<Song>> {
        let search_pattern = format!("%{}%", escape_like(query));

        let songs = sqlx::query_as::<_, Song>(
            r#"
            SELECT id, user_id, title, author, image_path, song_path, created_at
            FROM songs
            WHERE title LIKE ? ESCAPE '\'
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(&search_pattern)
        .fetch_all(self.pool)
        .await?;

        Ok(songs)
    }

    /// Count songs
    pub async fn count(&self) -> Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM songs")
            .fetch_one(self.pool)
            .await?;

        Ok(result.0)
    }
}

/// Escape `LIKE` wildcards so `query` matches literally
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
