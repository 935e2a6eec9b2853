use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::queue_entry::QueueState;

/// Delivery state of a mood entry as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Pending,
    Synced,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
        }
    }

    /// Moves to `next`. Only `pending -> synced` and `pending -> failed` are allowed.
    pub fn transition(self, next: SyncState) -> Result<SyncState, InvalidTransition> {
        match (self, next) {
            (SyncState::Pending, SyncState::Synced) | (SyncState::Pending, SyncState::Failed) => {
                Ok(next)
            }
            _ => Err(InvalidTransition::Sync {
                from: self,
                to: next,
            }),
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncState::Pending),
            "synced" => Ok(SyncState::Synced),
            "failed" => Ok(SyncState::Failed),
            _ => Err(format!(
                "Invalid sync state '{}'. Valid options: pending, synced, failed",
                s
            )),
        }
    }
}

/// Lifecycle of a single submission.
///
/// ```text
/// Created --ok--> Synced
/// Created --retryable--> Queued
/// Created --non-retryable--> Failed
/// Queued  --ok--> Synced
/// Queued  --retryable--> Queued
/// Queued  --exhausted / non-retryable--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Created,
    Queued,
    Synced,
    Failed,
}

/// Outcome of one delivery attempt, fed into [`EntryState::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryEvent {
    WriteSucceeded,
    RetryableFailure,
    NonRetryableFailure,
    AttemptsExhausted,
}

impl EntryState {
    pub fn apply(self, event: EntryEvent) -> Result<EntryState, InvalidTransition> {
        use EntryEvent::*;
        use EntryState::*;

        match (self, event) {
            (Created, WriteSucceeded) => Ok(Synced),
            (Created, RetryableFailure) => Ok(Queued),
            (Created, NonRetryableFailure) => Ok(Failed),
            (Created, AttemptsExhausted) => Err(InvalidTransition::Entry { from: self, event }),
            (Queued, WriteSucceeded) => Ok(Synced),
            (Queued, RetryableFailure) => Ok(Queued),
            (Queued, NonRetryableFailure) => Ok(Failed),
            (Queued, AttemptsExhausted) => Ok(Failed),
            (Synced, _) | (Failed, _) => Err(InvalidTransition::Entry { from: self, event }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryState::Synced | EntryState::Failed)
    }

    /// The state the UI shows for an entry in this lifecycle stage.
    pub fn sync_state(&self) -> SyncState {
        match self {
            EntryState::Created | EntryState::Queued => SyncState::Pending,
            EntryState::Synced => SyncState::Synced,
            EntryState::Failed => SyncState::Failed,
        }
    }
}

/// Where a stored queue row sits in the lifecycle.
impl From<QueueState> for EntryState {
    fn from(state: QueueState) -> Self {
        match state {
            QueueState::Queued => EntryState::Queued,
            QueueState::Failed => EntryState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTransition {
    Sync { from: SyncState, to: SyncState },
    Entry { from: EntryState, event: EntryEvent },
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidTransition::Sync { from, to } => {
                write!(f, "Invalid sync state transition: {} -> {}", from, to)
            }
            InvalidTransition::Entry { from, event } => {
                write!(f, "Invalid entry transition: {:?} on {:?}", from, event)
            }
        }
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_from_str() {
        assert_eq!(SyncState::from_str("pending").unwrap(), SyncState::Pending);
        assert_eq!(SyncState::from_str("SYNCED").unwrap(), SyncState::Synced);
        assert_eq!(SyncState::from_str("Failed").unwrap(), SyncState::Failed);
        assert!(SyncState::from_str("queued").is_err());
    }

    #[test]
    fn test_sync_state_allowed_transitions() {
        assert_eq!(
            SyncState::Pending.transition(SyncState::Synced),
            Ok(SyncState::Synced)
        );
        assert_eq!(
            SyncState::Pending.transition(SyncState::Failed),
            Ok(SyncState::Failed)
        );
    }

    #[test]
    fn test_sync_state_rejected_transitions() {
        for (from, to) in [
            (SyncState::Synced, SyncState::Pending),
            (SyncState::Synced, SyncState::Failed),
            (SyncState::Failed, SyncState::Pending),
            (SyncState::Failed, SyncState::Synced),
            (SyncState::Pending, SyncState::Pending),
        ] {
            assert!(from.transition(to).is_err(), "{} -> {} allowed", from, to);
        }
    }

    #[test]
    fn test_entry_happy_paths() {
        let state = EntryState::Created;
        assert_eq!(state.apply(EntryEvent::WriteSucceeded), Ok(EntryState::Synced));

        let queued = state.apply(EntryEvent::RetryableFailure).unwrap();
        assert_eq!(queued, EntryState::Queued);
        assert_eq!(
            queued.apply(EntryEvent::RetryableFailure),
            Ok(EntryState::Queued)
        );
        assert_eq!(queued.apply(EntryEvent::WriteSucceeded), Ok(EntryState::Synced));
        assert_eq!(
            queued.apply(EntryEvent::AttemptsExhausted),
            Ok(EntryState::Failed)
        );
    }

    #[test]
    fn test_entry_terminal_states_reject_events() {
        for state in [EntryState::Synced, EntryState::Failed] {
            assert!(state.is_terminal());
            for event in [
                EntryEvent::WriteSucceeded,
                EntryEvent::RetryableFailure,
                EntryEvent::NonRetryableFailure,
                EntryEvent::AttemptsExhausted,
            ] {
                assert!(state.apply(event).is_err());
            }
        }
    }

    #[test]
    fn test_created_cannot_exhaust() {
        assert!(EntryState::Created
            .apply(EntryEvent::AttemptsExhausted)
            .is_err());
    }

    #[test]
    fn test_entry_state_maps_to_sync_state() {
        assert_eq!(EntryState::Created.sync_state(), SyncState::Pending);
        assert_eq!(EntryState::Queued.sync_state(), SyncState::Pending);
        assert_eq!(EntryState::Synced.sync_state(), SyncState::Synced);
        assert_eq!(EntryState::Failed.sync_state(), SyncState::Failed);
    }

    #[test]
    fn test_parked_queue_row_cannot_be_delivered_again() {
        assert_eq!(EntryState::from(QueueState::Queued), EntryState::Queued);

        let parked = EntryState::from(QueueState::Failed);
        assert_eq!(parked, EntryState::Failed);
        assert_eq!(
            parked.apply(EntryEvent::WriteSucceeded),
            Err(InvalidTransition::Entry {
                from: EntryState::Failed,
                event: EntryEvent::WriteSucceeded,
            })
        );
    }
}
