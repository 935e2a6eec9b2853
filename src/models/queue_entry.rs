use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::mood_log::MoodLogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    /// Eligible for automatic flushing.
    Queued,
    /// Needs a manual retry.
    Failed,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Queued => "queued",
            QueueState::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(QueueState::Queued),
            "failed" => Ok(QueueState::Failed),
            _ => Err(format!("Invalid queue state '{}'", s)),
        }
    }
}

/// A mood entry waiting for (or given up on) remote delivery.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineQueueEntry {
    /// Insertion order. Flushing walks entries by ascending `seq`.
    pub seq: i64,
    pub entry: MoodLogEntry,
    pub state: QueueState,
    /// Failed retries from the queue. The initial submit is not counted.
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl OfflineQueueEntry {
    /// True when backoff allows another attempt at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == QueueState::Queued && self.next_attempt_at.map_or(true, |at| at <= now)
    }
}
