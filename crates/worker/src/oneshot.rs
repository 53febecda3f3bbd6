//! One compose run driven by a JSON request file.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use beatcut_pipeline::script_generator::ScriptRequest;
use beatcut_pipeline::{ComposeOrchestrator, ComposeRun};
use beatcut_render::events::RenderProgress;

/// ```json
/// {
///   "campaignId": "spring-launch",
///   "request": {
///     "artist": { "name": "NOVA", "genre": "kpop" },
///     "prompt": "summer comeback teaser",
///     "targetDuration": 15,
///     "trendKeywords": ["beach", "y2k"]
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeFile {
    pub campaign_id: String,
    #[serde(default)]
    pub generation_id: Option<String>,
    pub request: ScriptRequest,
}

impl ComposeFile {
    pub fn parse(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Invalid compose request")
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&json)
    }

    /// Start a run, generating a time-ordered generation id when none is given.
    pub fn into_run(self) -> ComposeRun {
        let generation_id = self
            .generation_id
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        ComposeRun::new(generation_id, self.campaign_id, self.request)
    }
}

/// Run every stage and return the run, failed or not.
pub async fn run_compose(
    orchestrator: &ComposeOrchestrator,
    file: ComposeFile,
    cancel: &CancellationToken,
) -> ComposeRun {
    let mut run = file.into_run();
    tracing::info!(
        generation_id = %run.job.generation_id,
        campaign_id = %run.job.campaign_id,
        "Compose run starting",
    );

    let on_progress = |p: &RenderProgress| {
        tracing::info!(
            job_id = %p.job_id,
            status = ?p.status,
            progress = p.progress,
            step = p.current_step.as_deref().unwrap_or("-"),
            "Render progress",
        );
    };

    match orchestrator.run(&mut run, cancel, Some(&on_progress)).await {
        Ok(()) => tracing::info!(
            generation_id = %run.job.generation_id,
            output_url = ?run.job.output_url,
            "Compose run completed",
        ),
        Err(e) => tracing::error!(
            generation_id = %run.job.generation_id,
            error = %e,
            "Compose run failed",
        ),
    }
    run
}
