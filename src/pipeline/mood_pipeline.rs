use chrono::{NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::error::PipelineError;
use crate::db::{OfflineQueueRepository, TodayCacheRepository};
use crate::models::{
    EntryEvent, EntryState, InvalidTransition, MoodLogEntry, OfflineQueueEntry, QueueState,
    SyncState,
};
use crate::remote::{RemoteError, RemoteStore};

type SlotKey = (String, NaiveDate);

/// What happened to a submission that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The remote store has the entry.
    Synced,
    /// The write failed transiently and the entry waits in the offline queue.
    Queued { reason: String },
}

impl SubmitOutcome {
    pub fn sync_state(&self) -> SyncState {
        match self {
            SubmitOutcome::Synced => SyncState::Synced,
            SubmitOutcome::Queued { .. } => SyncState::Pending,
        }
    }
}

/// Summary of one or more flush passes.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Another pass was already running; this call did nothing.
    pub skipped: bool,
    /// Entries delivered, in delivery order.
    pub synced: Vec<Uuid>,
    /// Entries that moved to failed during the pass.
    pub failures: Vec<PipelineError>,
    /// Entries still queued for automatic retry.
    pub remaining: usize,
    /// How long until the oldest queued entry may be tried again.
    pub retry_in: Option<Duration>,
}

impl FlushReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    fn absorb(&mut self, pass: FlushReport) {
        self.skipped = pass.skipped;
        self.synced.extend(pass.synced);
        self.failures.extend(pass.failures);
        self.remaining = pass.remaining;
        self.retry_in = pass.retry_in;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The cache now holds the remote value (or nothing, if the remote has none).
    Updated(Option<MoodLogEntry>),
    /// The read was dropped. Either a submission landed while it was in
    /// flight, or the cache holds a newer entry the remote has not seen yet.
    Stale,
}

/// Delivers mood entries to a remote store without losing or duplicating them.
///
/// Every submission updates the local "today" cache first, then tries the
/// remote upsert. Transient failures go to a durable FIFO queue that
/// [`flush_queue`](Self::flush_queue) retries with exponential backoff.
pub struct MoodPipeline<R> {
    remote: R,
    queue: OfflineQueueRepository,
    cache: TodayCacheRepository,
    backoff: BackoffPolicy,
    flushing: AtomicBool,
    /// Bumped whenever a submission rewrites a cache slot. Reads that started
    /// under an older generation are stale.
    slots: Mutex<HashMap<SlotKey, u64>>,
}

struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<R: RemoteStore> MoodPipeline<R> {
    pub fn new(
        remote: R,
        queue: OfflineQueueRepository,
        cache: TodayCacheRepository,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            remote,
            queue,
            cache,
            backoff,
            flushing: AtomicBool::new(false),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Submit a new mood entry.
    ///
    /// Returns `Ok` for both delivered and queued entries; the UI shows the
    /// optimistic value either way. Only validation and auth failures are
    /// returned as errors.
    pub async fn submit(&self, entry: MoodLogEntry) -> Result<SubmitOutcome, PipelineError> {
        entry.validate().map_err(PipelineError::Validation)?;

        let mut entry = entry;
        entry.sync_state = SyncState::Pending;

        {
            let mut slots = self.slots.lock().await;
            *slots
                .entry((entry.user_id.clone(), entry.date))
                .or_insert(0) += 1;
            self.cache.put(&entry).await?;
        }
        tracing::debug!(id = %entry.id, date = %entry.date, "cached mood optimistically");

        self.deliver(entry).await
    }

    /// Manually retry an entry that automatic flushing gave up on.
    ///
    /// The entry keeps its id, so the remote upsert stays idempotent, and
    /// starts a fresh lifecycle with zero attempts.
    pub async fn retry_failed(&self, id: Uuid) -> Result<SubmitOutcome, PipelineError> {
        let item = match self.queue.get(id).await? {
            Some(item) if item.state == QueueState::Failed => item,
            _ => return Err(PipelineError::NotFound(id)),
        };

        let mut entry = item.entry;
        entry.sync_state = SyncState::Pending;

        {
            let mut slots = self.slots.lock().await;
            if self.cache.put_unless_newer(&entry).await? {
                *slots
                    .entry((entry.user_id.clone(), entry.date))
                    .or_insert(0) += 1;
            }
        }

        tracing::info!(%id, previous_attempts = item.attempt_count, "manual retry");
        self.deliver(entry).await
    }

    /// Retry queued entries, oldest first, one at a time.
    ///
    /// Stops at the first entry that fails or is still backing off, so later
    /// entries never overtake earlier ones. Concurrent calls while a pass is
    /// running return a report with `skipped` set.
    pub async fn flush_queue(&self) -> Result<FlushReport, PipelineError> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("flush already in progress");
            return Ok(FlushReport::skipped());
        }
        let _guard = FlushGuard(&self.flushing);

        self.flush_pass().await
    }

    /// Flush repeatedly, sleeping out backoff delays, until nothing is left
    /// to retry automatically.
    pub async fn drain(&self) -> Result<FlushReport, PipelineError> {
        self.drain_until(|| true).await
    }

    /// Like [`drain`](Self::drain), but stops as soon as `online` reports offline.
    pub async fn drain_while(
        &self,
        online: &watch::Receiver<bool>,
    ) -> Result<FlushReport, PipelineError> {
        self.drain_until(|| *online.borrow()).await
    }

    /// Overwrite the cached "today" value with the remote one.
    ///
    /// A cached entry that is still pending and newer than the remote value
    /// is kept.
    pub async fn reconcile_today(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<ReconcileOutcome, PipelineError> {
        let key = (user_id.to_string(), date);
        let started_at = self.generation(&key).await;

        let remote = self
            .remote
            .today(user_id, date)
            .await
            .map_err(PipelineError::from_remote)?;

        let slots = self.slots.lock().await;
        if slots.get(&key).copied().unwrap_or(0) != started_at {
            tracing::debug!(user_id, %date, "discarding stale remote read");
            return Ok(ReconcileOutcome::Stale);
        }

        let remote = remote.map(|mut entry| {
            entry.sync_state = SyncState::Synced;
            entry
        });
        let applied = match &remote {
            Some(entry) => self.cache.put_remote(entry).await?,
            None => self.cache.clear_settled(user_id, date).await?,
        };
        drop(slots);

        if !applied {
            tracing::debug!(user_id, %date, "unsynced local entry is newer, keeping it");
            return Ok(ReconcileOutcome::Stale);
        }

        tracing::debug!(user_id, %date, found = remote.is_some(), "reconciled today's mood");
        Ok(ReconcileOutcome::Updated(remote))
    }

    /// The cached mood for a user's day, as the UI should show it.
    pub async fn today(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<MoodLogEntry>, PipelineError> {
        Ok(self.cache.get(user_id, date).await?)
    }

    /// Entries waiting for automatic retry, oldest first.
    pub async fn pending(&self) -> Result<Vec<OfflineQueueEntry>, PipelineError> {
        Ok(self.queue.list(QueueState::Queued).await?)
    }

    /// Entries that need a manual retry, oldest first.
    pub async fn failed(&self) -> Result<Vec<OfflineQueueEntry>, PipelineError> {
        Ok(self.queue.list(QueueState::Failed).await?)
    }

    async fn deliver(&self, entry: MoodLogEntry) -> Result<SubmitOutcome, PipelineError> {
        let result = self.remote.upsert(&entry).await;
        let event = delivery_event(&result, false);
        let next = EntryState::Created.apply(event)?;

        match (next, result) {
            (EntryState::Synced, _) => {
                self.queue.remove(entry.id).await?;
                self.settle(&entry, next).await?;
                tracing::info!(id = %entry.id, "mood entry synced");
                Ok(SubmitOutcome::Synced)
            }
            (EntryState::Queued, Err(e)) => {
                let reason = e.to_string();
                self.queue.enqueue(&entry, &reason, Utc::now()).await?;
                tracing::info!(id = %entry.id, error = %e, "remote write failed, entry queued");
                Ok(SubmitOutcome::Queued { reason })
            }
            (EntryState::Failed, Err(e)) => {
                self.queue.remove(entry.id).await?;
                self.settle(&entry, next).await?;
                tracing::warn!(id = %entry.id, error = %e, "remote rejected mood entry");
                Err(PipelineError::from_remote(e))
            }
            _ => Err(InvalidTransition::Entry {
                from: EntryState::Created,
                event,
            }
            .into()),
        }
    }

    async fn flush_pass(&self) -> Result<FlushReport, PipelineError> {
        let mut report = FlushReport::default();
        let mut touched: BTreeSet<SlotKey> = BTreeSet::new();

        while let Some(item) = self.queue.head().await? {
            let now = Utc::now();
            if !item.is_due(now) {
                report.retry_in = item
                    .next_attempt_at
                    .and_then(|at| (at - now).to_std().ok());
                break;
            }

            let id = item.entry.id;
            let from = EntryState::from(item.state);
            let attempts = item.attempt_count.saturating_add(1);

            let result = self.remote.upsert(&item.entry).await;
            let event = delivery_event(&result, self.backoff.is_exhausted(attempts));
            let next = from.apply(event)?;

            match (next, result) {
                (EntryState::Synced, _) => {
                    self.queue.remove(id).await?;
                    self.settle(&item.entry, next).await?;
                    tracing::info!(%id, retries = item.attempt_count, "queued mood entry synced");
                    touched.insert((item.entry.user_id.clone(), item.entry.date));
                    report.synced.push(id);
                }
                (EntryState::Queued, Err(e)) => {
                    let message = e.to_string();
                    let delay = self.backoff.delay_for(attempts);
                    let next_at = now
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::zero());
                    self.queue
                        .record_failure(id, attempts, now, next_at, &message)
                        .await?;
                    tracing::debug!(%id, attempts, ?delay, error = %e, "retry failed, backing off");
                    report.retry_in = Some(delay);
                    break;
                }
                (EntryState::Failed, Err(e)) if event == EntryEvent::AttemptsExhausted => {
                    let message = e.to_string();
                    self.queue.mark_failed(id, attempts, now, &message).await?;
                    self.settle(&item.entry, next).await?;
                    tracing::warn!(%id, attempts, error = %e, "giving up on queued mood entry");
                    report.failures.push(PipelineError::RetryExhausted {
                        id,
                        attempts,
                        last_error: message,
                    });
                    break;
                }
                (EntryState::Failed, Err(e)) => {
                    self.queue
                        .mark_failed(id, item.attempt_count, now, &e.to_string())
                        .await?;
                    self.settle(&item.entry, next).await?;
                    tracing::warn!(%id, error = %e, "remote rejected queued mood entry");
                    report.failures.push(PipelineError::from_remote(e));
                }
                _ => return Err(InvalidTransition::Entry { from, event }.into()),
            }
        }

        report.remaining = self.queue.count_queued().await?;

        for (user_id, date) in touched {
            if self.queue.count_queued_for_user(&user_id).await? > 0 {
                continue;
            }
            if let Err(e) = self.reconcile_today(&user_id, date).await {
                tracing::warn!(%user_id, %date, error = %e, "could not reconcile today's mood");
            }
        }

        Ok(report)
    }

    async fn drain_until(
        &self,
        keep_going: impl Fn() -> bool,
    ) -> Result<FlushReport, PipelineError> {
        let mut total = FlushReport::default();

        loop {
            let pass = self.flush_queue().await?;
            let wait = pass.retry_in;
            let done = pass.skipped || pass.remaining == 0;
            total.absorb(pass);

            if done || !keep_going() {
                break;
            }
            if let Some(delay) = wait {
                tokio::time::sleep(delay).await;
                if !keep_going() {
                    break;
                }
            }
        }

        Ok(total)
    }

    /// Record a terminal delivery result on the cached slot, unless it moved on.
    async fn settle(&self, entry: &MoodLogEntry, state: EntryState) -> Result<(), PipelineError> {
        if !state.is_terminal() {
            return Ok(());
        }
        let to = entry.sync_state.transition(state.sync_state())?;
        if !self.cache.settle(entry, to).await? {
            tracing::debug!(id = %entry.id, "cache holds a newer entry, response not applied");
        }
        Ok(())
    }

    async fn generation(&self, key: &SlotKey) -> u64 {
        self.slots.lock().await.get(key).copied().unwrap_or(0)
    }
}

fn delivery_event(result: &Result<(), RemoteError>, exhausted: bool) -> EntryEvent {
    match result {
        Ok(()) => EntryEvent::WriteSucceeded,
        Err(e) if !e.is_retryable() => EntryEvent::NonRetryableFailure,
        Err(_) if exhausted => EntryEvent::AttemptsExhausted,
        Err(_) => EntryEvent::RetryableFailure,
    }
}
