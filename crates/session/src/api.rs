//! REST API client for the engine's job endpoints.
//!
//! Wraps the engine HTTP API (job start, status retrieval, cancellation)
//! using [`reqwest`], and defines [`JobApi`], the narrow surface the
//! session orchestrator drives.

use serde::Deserialize;

use cityforge_core::types::JobId;

/// Raw job state reported by the engine's status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Response returned by the engine's `GET /jobs/{id}/status` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub status: RemoteStatus,
    /// Engine-reported percent, when the engine tracks one.
    #[serde(default)]
    pub progress: Option<u8>,
    /// Failure message when `status` is `failed`.
    #[serde(default)]
    pub error: Option<String>,
    /// Artifact reference when `status` is `completed`.
    #[serde(default)]
    pub result_reference: Option<String>,
}

/// Errors from the engine REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("Engine API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// Job-control surface the session orchestrator drives.
///
/// Implemented by [`EngineApi`] against the real engine; tests substitute
/// a scripted implementation.
pub trait JobApi: Send + Sync {
    /// Ask the engine to begin (or resume) the job.
    fn trigger(
        &self,
        job_id: &JobId,
    ) -> impl std::future::Future<Output = Result<(), EngineApiError>> + Send;

    /// Fetch the job's current status report.
    fn fetch_status(
        &self,
        job_id: &JobId,
    ) -> impl std::future::Future<Output = Result<JobStatusReport, EngineApiError>> + Send;
}

/// HTTP client for a single engine instance.
pub struct EngineApi {
    client: reqwest::Client,
    api_url: String,
}

impl EngineApi {
    /// Create a new API client for an engine instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:9040`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling across sessions).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Ask the engine to begin (or resume) generation for a job.
    ///
    /// Sends a `POST /jobs/{id}/start` request. The engine treats a
    /// repeated start for an already-running job as a no-op, so the call
    /// is safe to retry after a channel fallback.
    pub async fn start_job(&self, job_id: &JobId) -> Result<(), EngineApiError> {
        let response = self
            .client
            .post(format!("{}/jobs/{}/start", self.api_url, job_id))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Fetch the current status report for a job.
    ///
    /// Sends a `GET /jobs/{id}/status` request.
    pub async fn job_status(&self, job_id: &JobId) -> Result<JobStatusReport, EngineApiError> {
        let response = self
            .client
            .get(format!("{}/jobs/{}/status", self.api_url, job_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Ask the engine to cancel a queued or running job.
    ///
    /// Sends a `POST /jobs/{id}/cancel` request. Cancelling a job that
    /// already finished is accepted by the engine and does nothing.
    pub async fn cancel_job(&self, job_id: &JobId) -> Result<(), EngineApiError> {
        let response = self
            .client
            .post(format!("{}/jobs/{}/cancel", self.api_url, job_id))
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`EngineApiError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, EngineApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EngineApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), EngineApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

impl JobApi for EngineApi {
    async fn trigger(&self, job_id: &JobId) -> Result<(), EngineApiError> {
        self.start_job(job_id).await
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<JobStatusReport, EngineApiError> {
        self.job_status(job_id).await
    }
}
