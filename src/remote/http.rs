//! HTTP client for the mood remote store.

use chrono::NaiveDate;
use reqwest::StatusCode;
use std::time::Duration;

use super::{RemoteError, RemoteStore};
use crate::models::MoodLogEntry;

#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    server_url: String,
    api_key: String,
}

impl HttpRemoteStore {
    pub fn new(
        server_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            client,
            server_url: server_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Checks whether the server answers its health endpoint.
    pub async fn check(&self) -> bool {
        match self.client.get(self.build_url("/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Builds an HTTP URL for a given path.
    fn build_url(&self, path: &str) -> String {
        let base_url = if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }

    async fn error_from_response(response: reqwest::Response) -> RemoteError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("status {}", status)
        } else {
            body
        };
        RemoteError::from_status(status, message)
    }
}

fn send_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(e.to_string())
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn upsert(&self, entry: &MoodLogEntry) -> Result<(), RemoteError> {
        let url = self.build_url(&format!("/moods/{}", entry.id));

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_key)
            .json(entry)
            .send()
            .await
            .map_err(send_error)?;

        if response.status().is_success() {
            tracing::debug!(id = %entry.id, "remote upsert ok");
            Ok(())
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    async fn today(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<MoodLogEntry>, RemoteError> {
        let url = self.build_url("/moods/today");
        let date_str = date.to_string();

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("user_id", user_id), ("date", date_str.as_str())])
            .send()
            .await
            .map_err(send_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => response
                .json::<MoodLogEntry>()
                .await
                .map(Some)
                .map_err(|e| RemoteError::Decode(e.to_string())),
            _ => Err(Self::error_from_response(response).await),
        }
    }
}
