//! REST API client for the render engine.
//!
//! Wraps job submission (`POST /jobs`), status (`GET /jobs/{id}`) and
//! cancellation (`DELETE /jobs/{id}`) using [`reqwest`].

use crate::messages::{RenderSpec, StatusResponse, SubmitResponse};

/// HTTP client for a render engine instance.
pub struct RenderApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the render REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum RenderApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("Render API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl RenderApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://render:8080`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Queue a render job and return the engine-assigned id.
    pub async fn submit_job(&self, spec: &RenderSpec) -> Result<SubmitResponse, RenderApiError> {
        let response = self
            .client
            .post(format!("{}/jobs", self.api_url))
            .json(spec)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn get_status(&self, job_id: &str) -> Result<StatusResponse, RenderApiError> {
        let response = self
            .client
            .get(format!("{}/jobs/{}", self.api_url, job_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn cancel_job(&self, job_id: &str) -> Result<(), RenderApiError> {
        let response = self
            .client
            .delete(format!("{}/jobs/{}", self.api_url, job_id))
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RenderApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RenderApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RenderApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
