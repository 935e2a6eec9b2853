//! Offline-resilient mood submission.
//!
//! A [`MoodPipeline`](pipeline::MoodPipeline) writes each mood entry to a local
//! "today" cache first, then upserts it to a [`RemoteStore`](remote::RemoteStore)
//! keyed by its client-generated id. Entries that fail transiently wait in a
//! durable SQLite queue and are retried oldest first with exponential backoff.

pub mod config;
pub mod context;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod remote;
pub mod server;
