mod cache_repo;
mod queue_repo;

pub use cache_repo::TodayCacheRepository;
pub use queue_repo::OfflineQueueRepository;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{MoodLogEntry, SyncState};

/// Open the on-device database and run migrations.
pub async fn init_db(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations/client").run(&pool).await?;

    Ok(pool)
}

/// Fixed-width UTC timestamps so stored values sort lexicographically.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode_error(format!("bad timestamp '{}': {}", s, e)))
}

pub(crate) fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

/// Columns shared by every table that stores a mood entry.
pub(crate) struct EntryColumns {
    pub id: String,
    pub user_id: String,
    pub date: String,
    pub mood_value: Option<i64>,
    pub intensity: Option<i64>,
    pub note: Option<String>,
    pub created_at: String,
}

impl EntryColumns {
    pub fn into_entry(self, sync_state: SyncState) -> Result<MoodLogEntry, sqlx::Error> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| decode_error(format!("bad entry id '{}': {}", self.id, e)))?;
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| decode_error(format!("bad date '{}': {}", self.date, e)))?;

        Ok(MoodLogEntry {
            id,
            user_id: self.user_id,
            date,
            mood_value: small_int(self.mood_value, "mood_value")?,
            intensity: small_int(self.intensity, "intensity")?,
            note: self.note,
            created_at: parse_ts(&self.created_at)?,
            sync_state,
        })
    }
}

fn small_int(value: Option<i64>, column: &str) -> Result<Option<u8>, sqlx::Error> {
    value
        .map(|v| u8::try_from(v).map_err(|_| decode_error(format!("{} out of range: {}", column, v))))
        .transpose()
}
