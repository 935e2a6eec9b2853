use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::sync_state::SyncState;

pub const MOOD_MIN: u8 = 1;
pub const MOOD_MAX: u8 = 10;
pub const NOTE_MAX_CHARS: usize = 2000;

/// A single mood submission.
///
/// The id is generated on the device when the entry is created and never
/// changes, so every retry of the same entry upserts the same remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodLogEntry {
    pub id: Uuid,
    pub user_id: String,
    /// The day this mood belongs to.
    pub date: NaiveDate,
    pub mood_value: Option<u8>,
    pub intensity: Option<u8>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl MoodLogEntry {
    pub fn new(user_id: impl Into<String>, date: NaiveDate, mood_value: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            date,
            mood_value: Some(mood_value),
            intensity: None,
            note: None,
            created_at: Utc::now(),
            sync_state: SyncState::Pending,
        }
    }

    /// Entry for the current local day.
    pub fn for_today(user_id: impl Into<String>, mood_value: u8) -> Self {
        Self::new(user_id, Local::now().date_naive(), mood_value)
    }

    pub fn with_intensity(mut self, intensity: u8) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::new("user_id", "must not be empty"));
        }

        match self.mood_value {
            None => return Err(ValidationError::new("mood_value", "is required")),
            Some(v) if !(MOOD_MIN..=MOOD_MAX).contains(&v) => {
                return Err(ValidationError::new(
                    "mood_value",
                    format!("must be between {} and {}, got {}", MOOD_MIN, MOOD_MAX, v),
                ));
            }
            Some(_) => {}
        }

        if let Some(i) = self.intensity {
            if !(MOOD_MIN..=MOOD_MAX).contains(&i) {
                return Err(ValidationError::new(
                    "intensity",
                    format!("must be between {} and {}, got {}", MOOD_MIN, MOOD_MAX, i),
                ));
            }
        }

        if let Some(note) = &self.note {
            if note.chars().count() > NOTE_MAX_CHARS {
                return Err(ValidationError::new(
                    "note",
                    format!("must be at most {} characters", NOTE_MAX_CHARS),
                ));
            }
        }

        Ok(())
    }
}

impl fmt::Display for MoodLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mood_value {
            Some(v) => writeln!(f, "Mood: {}/{} on {}", v, MOOD_MAX, self.date)?,
            None => writeln!(f, "Mood: - on {}", self.date)?,
        }

        if let Some(i) = self.intensity {
            writeln!(f, "Intensity: {}/{}", i, MOOD_MAX)?;
        }

        if let Some(note) = &self.note {
            writeln!(f, "Note: {}", note)?;
        }

        write!(f, "Sync: {}", self.sync_state)
    }
}

/// A payload that can never be accepted, no matter how often it is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn test_new_entry_is_pending() {
        let entry = MoodLogEntry::new("user1", day(), 7);

        assert_eq!(entry.user_id, "user1");
        assert_eq!(entry.date, day());
        assert_eq!(entry.mood_value, Some(7));
        assert!(entry.intensity.is_none());
        assert!(entry.note.is_none());
        assert_eq!(entry.sync_state, SyncState::Pending);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = MoodLogEntry::new("user1", day(), 5);
        let b = MoodLogEntry::new("user1", day(), 5);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_valid_entry() {
        let entry = MoodLogEntry::new("user1", day(), 10)
            .with_intensity(1)
            .with_note("calm afternoon");
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_missing_mood_value() {
        let mut entry = MoodLogEntry::new("user1", day(), 5);
        entry.mood_value = None;

        let err = entry.validate().unwrap_err();
        assert_eq!(err.field, "mood_value");
        assert_eq!(err.to_string(), "mood_value is required");
    }

    #[test]
    fn test_out_of_range_values() {
        assert!(MoodLogEntry::new("user1", day(), 0).validate().is_err());
        assert!(MoodLogEntry::new("user1", day(), 11).validate().is_err());

        let err = MoodLogEntry::new("user1", day(), 5)
            .with_intensity(12)
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "intensity");
    }

    #[test]
    fn test_empty_user_rejected() {
        let err = MoodLogEntry::new("  ", day(), 5).validate().unwrap_err();
        assert_eq!(err.field, "user_id");
    }

    #[test]
    fn test_note_length_limit() {
        let ok = MoodLogEntry::new("user1", day(), 5).with_note("é".repeat(NOTE_MAX_CHARS));
        assert!(ok.validate().is_ok());

        let too_long =
            MoodLogEntry::new("user1", day(), 5).with_note("a".repeat(NOTE_MAX_CHARS + 1));
        assert_eq!(too_long.validate().unwrap_err().field, "note");
    }

    #[test]
    fn test_missing_sync_state_deserializes_as_pending() {
        let json = format!(
            r#"{{"id":"{}","user_id":"u","date":"2025-03-14","mood_value":4,"intensity":null,"note":null,"created_at":"2025-03-14T08:00:00Z"}}"#,
            Uuid::new_v4()
        );
        let entry: MoodLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry.sync_state, SyncState::Pending);
        assert_eq!(entry.mood_value, Some(4));
    }

    #[test]
    fn test_display() {
        let entry = MoodLogEntry::new("user1", day(), 7).with_note("good run");
        let output = format!("{}", entry);
        assert!(output.contains("7/10"));
        assert!(output.contains("2025-03-14"));
        assert!(output.contains("good run"));
        assert!(output.contains("pending"));
    }
}
