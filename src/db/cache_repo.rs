use chrono::NaiveDate;
use sqlx::SqlitePool;

use super::{decode_error, fmt_ts, EntryColumns};
use crate::models::{MoodLogEntry, SyncState};

/// Locally cached "today's mood", one row per user and day.
#[derive(Clone)]
pub struct TodayCacheRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct CacheRow {
    user_id: String,
    date: String,
    entry_id: String,
    mood_value: Option<i64>,
    intensity: Option<i64>,
    note: Option<String>,
    created_at: String,
    sync_state: String,
}

impl TodayCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Overwrite the slot for the entry's user and day.
    pub async fn put(&self, entry: &MoodLogEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO today_cache
                (user_id, date, entry_id, mood_value, intensity, note, created_at, sync_state)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.user_id)
        .bind(entry.date.to_string())
        .bind(entry.id.to_string())
        .bind(entry.mood_value.map(i64::from))
        .bind(entry.intensity.map(i64::from))
        .bind(&entry.note)
        .bind(fmt_ts(entry.created_at))
        .bind(entry.sync_state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Like [`put`](Self::put), but leaves a newer cached entry alone.
    ///
    /// Returns false when the slot already holds something created later.
    pub async fn put_unless_newer(&self, entry: &MoodLogEntry) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO today_cache
                (user_id, date, entry_id, mood_value, intensity, note, created_at, sync_state)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, date) DO UPDATE SET
                entry_id = excluded.entry_id,
                mood_value = excluded.mood_value,
                intensity = excluded.intensity,
                note = excluded.note,
                created_at = excluded.created_at,
                sync_state = excluded.sync_state
            WHERE excluded.created_at >= today_cache.created_at
            "#,
        )
        .bind(&entry.user_id)
        .bind(entry.date.to_string())
        .bind(entry.id.to_string())
        .bind(entry.mood_value.map(i64::from))
        .bind(entry.intensity.map(i64::from))
        .bind(&entry.note)
        .bind(fmt_ts(entry.created_at))
        .bind(entry.sync_state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<MoodLogEntry>, sqlx::Error> {
        let row: Option<CacheRow> =
            sqlx::query_as("SELECT * FROM today_cache WHERE user_id = ? AND date = ?")
                .bind(user_id)
                .bind(date.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::hydrate).transpose()
    }

    /// Settle the sync state of a pending entry, if it is still the one cached.
    ///
    /// Returns false when a newer submission has replaced it, in which case
    /// the response that triggered this call is stale and nothing changes.
    pub async fn settle(
        &self,
        entry: &MoodLogEntry,
        state: SyncState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE today_cache SET sync_state = ?
            WHERE user_id = ? AND date = ? AND entry_id = ? AND sync_state = 'pending'
            "#,
        )
        .bind(state.as_str())
        .bind(&entry.user_id)
        .bind(entry.date.to_string())
        .bind(entry.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store a value read from the remote store.
    ///
    /// An unsynced local entry created after `entry` is kept, since the
    /// remote has not seen it yet. Returns false when the slot was left alone.
    pub async fn put_remote(&self, entry: &MoodLogEntry) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO today_cache
                (user_id, date, entry_id, mood_value, intensity, note, created_at, sync_state)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, date) DO UPDATE SET
                entry_id = excluded.entry_id,
                mood_value = excluded.mood_value,
                intensity = excluded.intensity,
                note = excluded.note,
                created_at = excluded.created_at,
                sync_state = excluded.sync_state
            WHERE NOT (today_cache.sync_state = 'pending'
                       AND today_cache.created_at > excluded.created_at)
            "#,
        )
        .bind(&entry.user_id)
        .bind(entry.date.to_string())
        .bind(entry.id.to_string())
        .bind(entry.mood_value.map(i64::from))
        .bind(entry.intensity.map(i64::from))
        .bind(&entry.note)
        .bind(fmt_ts(entry.created_at))
        .bind(entry.sync_state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Empty a slot unless it holds an entry still waiting to sync.
    ///
    /// Returns false when a pending entry was kept.
    pub async fn clear_settled(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query(
            "DELETE FROM today_cache WHERE user_id = ? AND date = ? AND sync_state != 'pending'",
        )
        .bind(user_id)
        .bind(date.to_string())
        .execute(&self.pool)
        .await?;

        let (left,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM today_cache WHERE user_id = ? AND date = ?")
                .bind(user_id)
                .bind(date.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(left == 0)
    }

    fn hydrate(row: CacheRow) -> Result<MoodLogEntry, sqlx::Error> {
        let sync_state: SyncState = row.sync_state.parse().map_err(decode_error)?;
        EntryColumns {
            id: row.entry_id,
            user_id: row.user_id,
            date: row.date,
            mood_value: row.mood_value,
            intensity: row.intensity,
            note: row.note,
            created_at: row.created_at,
        }
        .into_entry(sync_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use chrono::Duration;
    use tempfile::TempDir;

    struct TestContext {
        repo: TodayCacheRepository,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        TestContext {
            repo: TodayCacheRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[tokio::test]
    async fn test_put_overwrites_slot() {
        let ctx = setup().await;
        let first = MoodLogEntry::new("user1", day(), 3);
        let second = MoodLogEntry::new("user1", day(), 9).with_note("better");

        ctx.repo.put(&first).await.unwrap();
        ctx.repo.put(&second).await.unwrap();

        let cached = ctx.repo.get("user1", day()).await.unwrap().unwrap();
        assert_eq!(cached.id, second.id);
        assert_eq!(cached.mood_value, Some(9));
        assert_eq!(cached.note.as_deref(), Some("better"));
        assert_eq!(cached.sync_state, SyncState::Pending);
    }

    #[tokio::test]
    async fn test_slots_are_per_user_and_day() {
        let ctx = setup().await;
        let tomorrow = day().succ_opt().unwrap();

        ctx.repo.put(&MoodLogEntry::new("user1", day(), 3)).await.unwrap();
        ctx.repo.put(&MoodLogEntry::new("user2", day(), 6)).await.unwrap();

        assert_eq!(
            ctx.repo.get("user1", day()).await.unwrap().unwrap().mood_value,
            Some(3)
        );
        assert_eq!(
            ctx.repo.get("user2", day()).await.unwrap().unwrap().mood_value,
            Some(6)
        );
        assert!(ctx.repo.get("user1", tomorrow).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settle_only_current_pending_entry() {
        let ctx = setup().await;
        let older = MoodLogEntry::new("user1", day(), 3);
        let newer = MoodLogEntry::new("user1", day(), 8);

        ctx.repo.put(&older).await.unwrap();
        ctx.repo.put(&newer).await.unwrap();

        // Late response for the replaced entry
        assert!(!ctx.repo.settle(&older, SyncState::Synced).await.unwrap());
        let cached = ctx.repo.get("user1", day()).await.unwrap().unwrap();
        assert_eq!(cached.sync_state, SyncState::Pending);

        assert!(ctx.repo.settle(&newer, SyncState::Synced).await.unwrap());
        let cached = ctx.repo.get("user1", day()).await.unwrap().unwrap();
        assert_eq!(cached.sync_state, SyncState::Synced);

        // Already settled
        assert!(!ctx.repo.settle(&newer, SyncState::Failed).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_unless_newer() {
        let ctx = setup().await;
        let mut older = MoodLogEntry::new("user1", day(), 2);
        older.created_at = older.created_at - Duration::minutes(10);
        let newer = MoodLogEntry::new("user1", day(), 7);

        ctx.repo.put(&newer).await.unwrap();
        assert!(!ctx.repo.put_unless_newer(&older).await.unwrap());
        let cached = ctx.repo.get("user1", day()).await.unwrap().unwrap();
        assert_eq!(cached.id, newer.id);

        let mut elsewhere = older.clone();
        elsewhere.user_id = "user2".to_string();
        assert!(ctx.repo.put_unless_newer(&elsewhere).await.unwrap());
        let cached = ctx.repo.get("user2", day()).await.unwrap().unwrap();
        assert_eq!(cached.id, elsewhere.id);
    }

    #[tokio::test]
    async fn test_put_remote_keeps_newer_pending_entry() {
        let ctx = setup().await;
        let mut server = MoodLogEntry::new("user1", day(), 3);
        server.created_at = server.created_at - Duration::minutes(5);
        server.sync_state = SyncState::Synced;
        let local = MoodLogEntry::new("user1", day(), 9);

        ctx.repo.put(&local).await.unwrap();
        assert!(!ctx.repo.put_remote(&server).await.unwrap());
        let cached = ctx.repo.get("user1", day()).await.unwrap().unwrap();
        assert_eq!(cached.id, local.id);
        assert_eq!(cached.sync_state, SyncState::Pending);

        // Once the local entry has settled the remote value wins
        ctx.repo.settle(&local, SyncState::Failed).await.unwrap();
        assert!(ctx.repo.put_remote(&server).await.unwrap());
        let cached = ctx.repo.get("user1", day()).await.unwrap().unwrap();
        assert_eq!(cached.id, server.id);
        assert_eq!(cached.sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_put_remote_replaces_older_pending_entry() {
        let ctx = setup().await;
        let mut local = MoodLogEntry::new("user1", day(), 4);
        local.created_at = local.created_at - Duration::minutes(5);
        let mut server = MoodLogEntry::new("user1", day(), 6);
        server.sync_state = SyncState::Synced;

        ctx.repo.put(&local).await.unwrap();
        assert!(ctx.repo.put_remote(&server).await.unwrap());
        let cached = ctx.repo.get("user1", day()).await.unwrap().unwrap();
        assert_eq!(cached.id, server.id);
    }

    #[tokio::test]
    async fn test_clear_settled_keeps_pending_entry() {
        let ctx = setup().await;
        let mut synced = MoodLogEntry::new("user1", day(), 5);
        synced.sync_state = SyncState::Synced;
        ctx.repo.put(&synced).await.unwrap();

        assert!(ctx.repo.clear_settled("user1", day()).await.unwrap());
        assert!(ctx.repo.get("user1", day()).await.unwrap().is_none());

        let pending = MoodLogEntry::new("user1", day(), 8);
        ctx.repo.put(&pending).await.unwrap();
        assert!(!ctx.repo.clear_settled("user1", day()).await.unwrap());
        let cached = ctx.repo.get("user1", day()).await.unwrap().unwrap();
        assert_eq!(cached.id, pending.id);
    }
}
