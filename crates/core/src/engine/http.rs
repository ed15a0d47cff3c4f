//! HTTP job engine client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::debug;

use crate::config::EngineConfig;
use crate::job::JobRecord;

use super::{EngineError, JobEngine, StartJobRequest};

/// Talks to an external engine exposing `/jobs` endpoints.
pub struct HttpJobEngine {
    client: Client,
    config: EngineConfig,
}

impl HttpJobEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| EngineError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn job_url(&self, job_id: &str, suffix: &str) -> String {
        format!(
            "{}/jobs/{}{}",
            self.base_url(),
            urlencoding::encode(job_id),
            suffix
        )
    }

    fn map_send_error(e: reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::Timeout
        } else if e.is_connect() {
            EngineError::ConnectionFailed(e.to_string())
        } else {
            EngineError::Rejected(e.to_string())
        }
    }

    async fn check(response: Response, job_id: &str) -> Result<(), EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 404 {
            return Err(EngineError::JobNotFound(job_id.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::Rejected(format!(
            "HTTP {}: {}",
            status,
            body.chars().take(100).collect::<String>()
        )))
    }
}

#[async_trait]
impl JobEngine for HttpJobEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(&self, job: &JobRecord) -> Result<(), EngineError> {
        let url = format!("{}/jobs", self.base_url());
        debug!(job_id = %job.id, url = %url, "Starting job on engine");
        let response = self
            .client
            .post(&url)
            .json(&StartJobRequest::from(job))
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Self::check(response, &job.id).await
    }

    async fn retry(&self, job_id: &str) -> Result<(), EngineError> {
        let url = self.job_url(job_id, "/retry");
        debug!(job_id, url = %url, "Retrying job on engine");
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Self::check(response, job_id).await
    }

    async fn cancel(&self, job_id: &str) -> Result<(), EngineError> {
        let url = self.job_url(job_id, "");
        debug!(job_id, url = %url, "Cancelling job on engine");
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Self::check(response, job_id).await
    }
}
