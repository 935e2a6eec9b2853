//! Server-side mood storage.
//!
//! One SQLite database holds every user's entries:
//! ```text
//! <DATA_DIR>/
//!   moods.db
//! ```
//! Rows are keyed by the client-generated entry id, so a repeated upsert of
//! the same entry replaces the row instead of adding one.

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::db::{fmt_ts, EntryColumns};
use crate::models::{MoodLogEntry, SyncState};

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum StoreError {
    /// The id already belongs to another user's entry.
    Conflict(String),
    Database(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict(id) => write!(f, "Entry {} belongs to another user", id),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::Conflict(_) => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

#[derive(sqlx::FromRow)]
struct MoodRow {
    id: String,
    user_id: String,
    date: String,
    mood_value: i64,
    intensity: Option<i64>,
    note: Option<String>,
    created_at: String,
}

impl MoodRow {
    fn into_entry(self) -> Result<MoodLogEntry, sqlx::Error> {
        EntryColumns {
            id: self.id,
            user_id: self.user_id,
            date: self.date,
            mood_value: Some(self.mood_value),
            intensity: self.intensity,
            note: self.note,
            created_at: self.created_at,
        }
        .into_entry(SyncState::Synced)
    }
}

#[derive(Debug, Clone)]
pub struct MoodStore {
    pool: SqlitePool,
}

impl MoodStore {
    /// Opens (creating if needed) the mood database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations/server")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(Self { pool })
    }

    /// Inserts the entry or replaces the row with the same id.
    ///
    /// Fails with [`StoreError::Conflict`] if the id is taken by another user.
    pub async fn upsert(&self, entry: &MoodLogEntry) -> Result<(), StoreError> {
        let mood_value = entry.mood_value.map(i64::from);

        let result = sqlx::query(
            r#"
            INSERT INTO moods (id, user_id, date, mood_value, intensity, note, created_at, received_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                date = excluded.date,
                mood_value = excluded.mood_value,
                intensity = excluded.intensity,
                note = excluded.note,
                created_at = excluded.created_at,
                received_at = excluded.received_at
            WHERE moods.user_id = excluded.user_id
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.user_id)
        .bind(entry.date.to_string())
        .bind(mood_value)
        .bind(entry.intensity.map(i64::from))
        .bind(&entry.note)
        .bind(fmt_ts(entry.created_at))
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(entry.id.to_string()));
        }
        Ok(())
    }

    /// The most recently created entry for the user's day.
    pub async fn latest_for(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<MoodLogEntry>, StoreError> {
        let row: Option<MoodRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, date, mood_value, intensity, note, created_at
            FROM moods
            WHERE user_id = ? AND date = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(date.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MoodRow::into_entry).transpose()?)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM moods")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
