//! Session-scoped application context.
//!
//! Built once when a session starts and passed explicitly to whatever needs
//! the pipeline. Dropping it (or calling [`AppContext::shutdown`]) ends the
//! session.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::{init_db, OfflineQueueRepository, TodayCacheRepository};
use crate::pipeline::MoodPipeline;
use crate::remote::{HttpRemoteStore, RemoteError, RemoteStore};

pub struct AppContext<R = HttpRemoteStore> {
    config: Config,
    pool: SqlitePool,
    pipeline: MoodPipeline<R>,
}

impl AppContext<HttpRemoteStore> {
    /// Open the local database and connect the pipeline to the configured server.
    pub async fn start(config: Config) -> Result<Self, ContextError> {
        let remote = match (&config.remote.server_url, &config.remote.api_key) {
            (Some(url), Some(key)) => HttpRemoteStore::new(url, key, config.remote.timeout())?,
            _ => return Err(ContextError::RemoteNotConfigured),
        };
        Self::with_remote(config, remote).await
    }
}

impl<R: RemoteStore> AppContext<R> {
    pub async fn with_remote(config: Config, remote: R) -> Result<Self, ContextError> {
        let pool = init_db(&config.database_path.value).await?;
        let pipeline = MoodPipeline::new(
            remote,
            OfflineQueueRepository::new(pool.clone()),
            TodayCacheRepository::new(pool.clone()),
            config.retry.backoff(),
        );

        tracing::debug!(
            database = %config.database_path.value.display(),
            user_id = %config.user_id.value,
            "session started"
        );

        Ok(Self {
            config,
            pool,
            pipeline,
        })
    }

    pub fn pipeline(&self) -> &MoodPipeline<R> {
        &self.pipeline
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id.value
    }

    /// Close the database pool, waiting for in-flight queries.
    pub async fn shutdown(self) {
        self.pool.close().await;
        tracing::debug!("session ended");
    }
}

#[derive(Debug)]
pub enum ContextError {
    RemoteNotConfigured,
    Remote(RemoteError),
    Storage(sqlx::Error),
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextError::RemoteNotConfigured => write!(
                f,
                "Remote store not configured. Set remote.server_url and remote.api_key \
                 in the config file or MOOD_SERVER_URL and MOOD_API_KEY."
            ),
            ContextError::Remote(e) => write!(f, "Could not set up remote store: {}", e),
            ContextError::Storage(e) => write!(f, "Could not open local database: {}", e),
        }
    }
}

impl std::error::Error for ContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContextError::RemoteNotConfigured => None,
            ContextError::Remote(e) => Some(e),
            ContextError::Storage(e) => Some(e),
        }
    }
}

impl From<RemoteError> for ContextError {
    fn from(e: RemoteError) -> Self {
        ContextError::Remote(e)
    }
}

impl From<sqlx::Error> for ContextError {
    fn from(e: sqlx::Error) -> Self {
        ContextError::Storage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MoodLogEntry;
    use crate::pipeline::SubmitOutcome;
    use crate::remote::mock::MockRemoteStore;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir, extra: &str) -> Config {
        let config_path = temp_dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: mood.db").unwrap();
        writeln!(file, "user_id: alice").unwrap();
        write!(file, "{}", extra).unwrap();
        Config::load(Some(config_path)).unwrap()
    }

    #[tokio::test]
    async fn test_start_requires_remote() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(&temp_dir, "");

        let result = AppContext::start(config).await;
        assert!(matches!(result, Err(ContextError::RemoteNotConfigured)));
    }

    #[tokio::test]
    async fn test_start_with_configured_remote() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(
            &temp_dir,
            "remote:\n  server_url: http://127.0.0.1:9\n  api_key: secret\n",
        );

        let ctx = AppContext::start(config).await.unwrap();
        assert_eq!(ctx.user_id(), "alice");
        assert_eq!(ctx.pipeline().remote().server_url(), "http://127.0.0.1:9");
        assert!(temp_dir.path().join("mood.db").exists());
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_outlives_session() {
        let temp_dir = TempDir::new().unwrap();
        let entry = MoodLogEntry::for_today("alice", 6);

        let ctx = AppContext::with_remote(write_config(&temp_dir, ""), MockRemoteStore::offline())
            .await
            .unwrap();
        let outcome = ctx.pipeline().submit(entry.clone()).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
        ctx.shutdown().await;

        let ctx = AppContext::with_remote(write_config(&temp_dir, ""), MockRemoteStore::new())
            .await
            .unwrap();
        let pending = ctx.pipeline().pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entry.id, entry.id);

        let report = ctx.pipeline().flush_queue().await.unwrap();
        assert_eq!(report.synced, vec![entry.id]);
        ctx.shutdown().await;
    }
}
