use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decode_error, fmt_ts, parse_ts, EntryColumns};
use crate::models::{MoodLogEntry, OfflineQueueEntry, QueueState, SyncState};

/// Durable FIFO of mood entries awaiting remote delivery.
#[derive(Clone)]
pub struct OfflineQueueRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    seq: i64,
    id: String,
    user_id: String,
    date: String,
    mood_value: Option<i64>,
    intensity: Option<i64>,
    note: Option<String>,
    created_at: String,
    state: String,
    attempt_count: i64,
    last_attempt_at: Option<String>,
    next_attempt_at: Option<String>,
    last_error: Option<String>,
}

impl OfflineQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Queue an entry after its first failed write.
    ///
    /// The entry is eligible again at `now`. Re-enqueueing an id that is
    /// already present starts it over with zero attempts but keeps its
    /// original position.
    pub async fn enqueue(
        &self,
        entry: &MoodLogEntry,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let now_str = fmt_ts(now);

        sqlx::query(
            r#"
            INSERT INTO offline_queue
                (id, user_id, date, mood_value, intensity, note, created_at,
                 state, attempt_count, last_attempt_at, next_attempt_at, last_error)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'queued', 0, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                mood_value = excluded.mood_value,
                intensity = excluded.intensity,
                note = excluded.note,
                state = 'queued',
                attempt_count = 0,
                last_attempt_at = excluded.last_attempt_at,
                next_attempt_at = excluded.next_attempt_at,
                last_error = excluded.last_error
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.user_id)
        .bind(entry.date.to_string())
        .bind(entry.mood_value.map(i64::from))
        .bind(entry.intensity.map(i64::from))
        .bind(&entry.note)
        .bind(fmt_ts(entry.created_at))
        .bind(&now_str)
        .bind(&now_str)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a failed retry and when the next one may happen.
    pub async fn record_failure(
        &self,
        id: Uuid,
        attempt_count: u32,
        now: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE offline_queue
            SET attempt_count = ?, last_attempt_at = ?, next_attempt_at = ?, last_error = ?
            WHERE id = ? AND state = 'queued'
            "#,
        )
        .bind(i64::from(attempt_count))
        .bind(fmt_ts(now))
        .bind(fmt_ts(next_attempt_at))
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Park an entry as failed. It is skipped by automatic flushing.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        attempt_count: u32,
        now: DateTime<Utc>,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE offline_queue
            SET state = 'failed', attempt_count = ?, last_attempt_at = ?,
                next_attempt_at = NULL, last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(i64::from(attempt_count))
        .bind(fmt_ts(now))
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM offline_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<OfflineQueueEntry>, sqlx::Error> {
        let row: Option<QueueRow> = sqlx::query_as("SELECT * FROM offline_queue WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::hydrate).transpose()
    }

    /// Oldest queued entry, if any.
    pub async fn head(&self) -> Result<Option<OfflineQueueEntry>, sqlx::Error> {
        let row: Option<QueueRow> = sqlx::query_as(
            "SELECT * FROM offline_queue WHERE state = 'queued' ORDER BY seq LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::hydrate).transpose()
    }

    pub async fn list(&self, state: QueueState) -> Result<Vec<OfflineQueueEntry>, sqlx::Error> {
        let rows: Vec<QueueRow> =
            sqlx::query_as("SELECT * FROM offline_queue WHERE state = ? ORDER BY seq")
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Self::hydrate).collect()
    }

    pub async fn count_queued(&self) -> Result<usize, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM offline_queue WHERE state = 'queued'")
                .fetch_one(&self.pool)
                .await?;
        to_count(count)
    }

    pub async fn count_queued_for_user(&self, user_id: &str) -> Result<usize, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM offline_queue WHERE state = 'queued' AND user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        to_count(count)
    }

    fn hydrate(row: QueueRow) -> Result<OfflineQueueEntry, sqlx::Error> {
        let state: QueueState = row.state.parse().map_err(decode_error)?;
        let sync_state = match state {
            QueueState::Queued => SyncState::Pending,
            QueueState::Failed => SyncState::Failed,
        };

        let entry = EntryColumns {
            id: row.id,
            user_id: row.user_id,
            date: row.date,
            mood_value: row.mood_value,
            intensity: row.intensity,
            note: row.note,
            created_at: row.created_at,
        }
        .into_entry(sync_state)?;

        Ok(OfflineQueueEntry {
            seq: row.seq,
            entry,
            state,
            attempt_count: u32::try_from(row.attempt_count).unwrap_or(u32::MAX),
            last_attempt_at: row.last_attempt_at.as_deref().map(parse_ts).transpose()?,
            next_attempt_at: row.next_attempt_at.as_deref().map(parse_ts).transpose()?,
            last_error: row.last_error,
        })
    }
}

fn to_count(count: i64) -> Result<usize, sqlx::Error> {
    usize::try_from(count).map_err(|_| decode_error(format!("Invalid row count {}", count)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use chrono::{Duration, NaiveDate};
    use tempfile::TempDir;

    struct TestContext {
        repo: OfflineQueueRepository,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        TestContext {
            repo: OfflineQueueRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    fn entry(mood: u8) -> MoodLogEntry {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        MoodLogEntry::new("user1", date, mood)
    }

    #[tokio::test]
    async fn test_enqueue_and_get() {
        let ctx = setup().await;
        let e = entry(7).with_intensity(4).with_note("rainy");
        let now = Utc::now();

        ctx.repo.enqueue(&e, "connection refused", now).await.unwrap();

        let item = ctx.repo.get(e.id).await.unwrap().unwrap();
        assert_eq!(item.entry.id, e.id);
        assert_eq!(item.entry.mood_value, Some(7));
        assert_eq!(item.entry.intensity, Some(4));
        assert_eq!(item.entry.note.as_deref(), Some("rainy"));
        assert_eq!(item.entry.sync_state, SyncState::Pending);
        assert_eq!(item.state, QueueState::Queued);
        assert_eq!(item.attempt_count, 0);
        assert_eq!(item.last_error.as_deref(), Some("connection refused"));
        assert!(item.is_due(now));
    }

    #[tokio::test]
    async fn test_head_is_oldest_queued() {
        let ctx = setup().await;
        let first = entry(1);
        let second = entry(2);
        let now = Utc::now();

        ctx.repo.enqueue(&first, "offline", now).await.unwrap();
        ctx.repo.enqueue(&second, "offline", now).await.unwrap();

        assert_eq!(ctx.repo.head().await.unwrap().unwrap().entry.id, first.id);

        ctx.repo.mark_failed(first.id, 5, now, "gave up").await.unwrap();
        assert_eq!(ctx.repo.head().await.unwrap().unwrap().entry.id, second.id);

        ctx.repo.remove(second.id).await.unwrap();
        assert!(ctx.repo.head().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_re_enqueue_keeps_position_and_resets_attempts() {
        let ctx = setup().await;
        let first = entry(1);
        let second = entry(2);
        let now = Utc::now();

        ctx.repo.enqueue(&first, "offline", now).await.unwrap();
        ctx.repo.enqueue(&second, "offline", now).await.unwrap();
        ctx.repo.mark_failed(first.id, 5, now, "gave up").await.unwrap();

        ctx.repo.enqueue(&first, "offline again", now).await.unwrap();

        let queued = ctx.repo.list(QueueState::Queued).await.unwrap();
        let ids: Vec<Uuid> = queued.iter().map(|q| q.entry.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(queued[0].attempt_count, 0);
    }

    #[tokio::test]
    async fn test_record_failure_schedules_next_attempt() {
        let ctx = setup().await;
        let e = entry(3);
        let now = Utc::now();
        ctx.repo.enqueue(&e, "offline", now).await.unwrap();

        let next = now + Duration::seconds(4);
        ctx.repo
            .record_failure(e.id, 3, now, next, "timeout")
            .await
            .unwrap();

        let item = ctx.repo.get(e.id).await.unwrap().unwrap();
        assert_eq!(item.attempt_count, 3);
        assert_eq!(item.last_error.as_deref(), Some("timeout"));
        assert!(!item.is_due(now));
        assert!(item.is_due(next));
    }

    #[tokio::test]
    async fn test_mark_failed_lists_separately() {
        let ctx = setup().await;
        let e = entry(3);
        let now = Utc::now();
        ctx.repo.enqueue(&e, "offline", now).await.unwrap();
        ctx.repo.mark_failed(e.id, 5, now, "exhausted").await.unwrap();

        assert!(ctx.repo.list(QueueState::Queued).await.unwrap().is_empty());
        let failed = ctx.repo.list(QueueState::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].entry.sync_state, SyncState::Failed);
        assert!(failed[0].next_attempt_at.is_none());
        assert_eq!(ctx.repo.count_queued().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counts_per_user() {
        let ctx = setup().await;
        let now = Utc::now();
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();

        ctx.repo.enqueue(&entry(1), "offline", now).await.unwrap();
        ctx.repo.enqueue(&entry(2), "offline", now).await.unwrap();
        ctx.repo
            .enqueue(&MoodLogEntry::new("user2", date, 5), "offline", now)
            .await
            .unwrap();

        assert_eq!(ctx.repo.count_queued().await.unwrap(), 3);
        assert_eq!(ctx.repo.count_queued_for_user("user1").await.unwrap(), 2);
        assert_eq!(ctx.repo.count_queued_for_user("user2").await.unwrap(), 1);
        assert_eq!(ctx.repo.count_queued_for_user("nobody").await.unwrap(), 0);
    }

    #[test]
    fn test_negative_count_is_decode_error() {
        assert_eq!(to_count(0).unwrap(), 0);
        assert_eq!(to_count(42).unwrap(), 42);
        assert!(matches!(to_count(-1), Err(sqlx::Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.db");
        let e = entry(8);

        {
            let pool = init_db(&path).await.unwrap();
            OfflineQueueRepository::new(pool.clone())
                .enqueue(&e, "offline", Utc::now())
                .await
                .unwrap();
            pool.close().await;
        }

        let pool = init_db(&path).await.unwrap();
        let item = OfflineQueueRepository::new(pool)
            .get(e.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.entry.mood_value, Some(8));
    }

    #[tokio::test]
    async fn test_remove_missing_returns_false() {
        let ctx = setup().await;
        assert!(!ctx.repo.remove(Uuid::new_v4()).await.unwrap());
    }
}
