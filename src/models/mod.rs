mod mood_log;
mod queue_entry;
mod sync_state;

pub use mood_log::{MoodLogEntry, ValidationError, MOOD_MAX, MOOD_MIN, NOTE_MAX_CHARS};
pub use queue_entry::{OfflineQueueEntry, QueueState};
pub use sync_state::{EntryEvent, EntryState, InvalidTransition, SyncState};
