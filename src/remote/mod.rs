//! The remote store the pipeline delivers mood entries to.
//!
//! The pipeline only needs two things from it: an upsert keyed by the
//! client-generated entry id, and a read of the latest entry for a user's
//! day. [`HttpRemoteStore`] speaks the HTTP binding served by
//! `moodsync-server`.

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpRemoteStore;

use chrono::NaiveDate;
use std::future::Future;

use crate::models::MoodLogEntry;

pub trait RemoteStore {
    /// Insert or replace the record with `entry.id`. Repeating the call with
    /// the same entry must leave exactly one record.
    fn upsert(&self, entry: &MoodLogEntry) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Latest entry for the user's day, if one exists.
    fn today(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Option<MoodLogEntry>, RemoteError>> + Send;
}

/// Errors that can occur talking to the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Could not reach the server
    Network(String),
    /// Request timed out
    Timeout,
    /// Server-side failure or throttling (5xx, 408, 429)
    Server { status: u16, message: String },
    /// The server rejected the payload
    Validation(String),
    /// Session is missing or no longer valid
    Unauthorized(String),
    /// Response body could not be understood
    Decode(String),
}

impl RemoteError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => RemoteError::Unauthorized(message),
            408 | 429 | 500..=599 => RemoteError::Server { status, message },
            _ => RemoteError::Validation(message),
        }
    }

    /// True for failures that may succeed if the same request is sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout | RemoteError::Server { .. } => true,
            RemoteError::Validation(_) | RemoteError::Unauthorized(_) | RemoteError::Decode(_) => {
                false
            }
        }
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Network(e) => write!(f, "Network error: {}", e),
            RemoteError::Timeout => write!(f, "Request timed out"),
            RemoteError::Server { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            RemoteError::Validation(e) => write!(f, "Rejected by server: {}", e),
            RemoteError::Unauthorized(e) => write!(f, "Unauthorized: {}", e),
            RemoteError::Decode(e) => write!(f, "Invalid response: {}", e),
        }
    }
}

impl std::error::Error for RemoteError {}
