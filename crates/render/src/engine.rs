use async_trait::async_trait;

use crate::api::{RenderApi, RenderApiError};
use crate::messages::{JobStatus, RenderSpec};

/// A video render backend. Rendering itself is opaque; callers submit a
/// spec and poll for status.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn submit(&self, spec: &RenderSpec) -> Result<String, RenderApiError>;

    async fn status(&self, job_id: &str) -> Result<JobStatus, RenderApiError>;

    /// Ask the backend to stop a queued or running job.
    async fn cancel(&self, job_id: &str) -> Result<(), RenderApiError>;
}

#[async_trait]
impl RenderEngine for RenderApi {
    async fn submit(&self, spec: &RenderSpec) -> Result<String, RenderApiError> {
        let response = self.submit_job(spec).await?;
        tracing::info!(
            generation_id = %spec.generation_id,
            job_id = %response.job_id,
            slides = spec.slides.len(),
            "Render job submitted",
        );
        Ok(response.job_id)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, RenderApiError> {
        Ok(self.get_status(job_id).await?.into())
    }

    async fn cancel(&self, job_id: &str) -> Result<(), RenderApiError> {
        self.cancel_job(job_id).await?;
        tracing::info!(job_id = %job_id, "Render job cancelled");
        Ok(())
    }
}
