//! Compose orchestration: script → effects → images → music → render.
//!
//! Each stage is a method on [`ComposeOrchestrator`] operating on a
//! [`ComposeRun`], so a caller can re-run drafting or sourcing (or change
//! the image selection) before rendering. A stage that fails marks the job
//! `Failed`; a stage attempted from the wrong state returns a conflict and
//! leaves the job alone.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use beatcut_core::compose::{ComposeJob, ComposeStage, ImageCandidate, RenderStatus};
use beatcut_core::effects::EffectAnalysis;
use beatcut_core::error::CoreError;
use beatcut_core::script::Script;
use beatcut_render::engine::RenderEngine;
use beatcut_render::messages::{AudioTrack, Caption, EffectPreset, RenderSpec, Slide};
use beatcut_render::poller::{PollOutcome, ProgressCallback, RenderJobPoller};

use crate::effect_analyzer::{EffectAnalyzer, EffectRequest};
use crate::error::PipelineError;
use crate::image_cache::CachedImageResult;
use crate::music::{MatchedAudio, MusicMatcher};
use crate::script_generator::{ScriptGenerationResult, ScriptGenerator, ScriptRequest};
use crate::sourcing::ImageSourcer;

pub const OUTPUT_WIDTH: u32 = 1080;
pub const OUTPUT_HEIGHT: u32 = 1920;

/// Everything a compose run has produced so far.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeRun {
    pub job: ComposeJob,
    pub request: ScriptRequest,
    pub draft: Option<ScriptGenerationResult>,
    pub effects: Option<EffectAnalysis>,
    pub candidates: Vec<ImageCandidate>,
    pub audio: Option<MatchedAudio>,
}

impl ComposeRun {
    pub fn new(generation_id: impl Into<String>, campaign_id: impl Into<String>, request: ScriptRequest) -> Self {
        Self {
            job: ComposeJob::new(generation_id, campaign_id),
            request,
            draft: None,
            effects: None,
            candidates: Vec::new(),
            audio: None,
        }
    }

    /// Change which candidates are used. Unknown ids are ignored; sort
    /// order follows the order of `ids`.
    pub fn select_images(&mut self, ids: &[String]) -> Result<(), CoreError> {
        self.job.ensure_editable()?;
        for candidate in &mut self.candidates {
            match ids.iter().position(|id| *id == candidate.id) {
                Some(pos) => {
                    candidate.is_selected = true;
                    candidate.sort_order = pos as u32;
                }
                None => candidate.is_selected = false,
            }
        }
        self.job.selected_images = selected(&self.candidates);
        Ok(())
    }
}

fn selected(candidates: &[ImageCandidate]) -> Vec<ImageCandidate> {
    let mut out: Vec<ImageCandidate> = candidates.iter().filter(|c| c.is_selected).cloned().collect();
    out.sort_by_key(|c| c.sort_order);
    out
}

fn missing(what: &str) -> PipelineError {
    PipelineError::Core(CoreError::Conflict(format!("{what} has not run yet")))
}

// ---------------------------------------------------------------------------
// Render spec
// ---------------------------------------------------------------------------

/// Spread the images evenly over the script duration, one caption per line,
/// with the music offset so its drop meets the script's climax.
pub fn build_render_spec(
    generation_id: &str,
    script: &Script,
    images: &[CachedImageResult],
    audio: Option<&MatchedAudio>,
    effects: Option<&EffectAnalysis>,
) -> RenderSpec {
    let duration = script.total_duration;
    let per_slide = if images.is_empty() {
        0.0
    } else {
        duration / images.len() as f64
    };
    let slides = images
        .iter()
        .enumerate()
        .map(|(i, image)| Slide {
            image_url: image.url.clone(),
            start: i as f64 * per_slide,
            duration: per_slide,
        })
        .collect();
    let captions = script
        .lines
        .iter()
        .map(|line| Caption {
            text: line.text.clone(),
            start: line.timing,
            duration: line.duration,
            purpose: line
                .purpose
                .and_then(|p| serde_json::to_value(p).ok())
                .and_then(|v| v.as_str().map(str::to_string)),
        })
        .collect();
    // The track's drop plays under the first climax line.
    let audio = audio.map(|m| AudioTrack {
        url: m.asset.url.clone(),
        start_offset: m.analysis.offset_for_climax(script.climax_timing(), duration),
    });
    let effects = effects
        .map(|e| EffectPreset {
            effects: e.effects.clone(),
            transitions: e.transitions.clone(),
            color_grade: e.color_grade.clone(),
        })
        .unwrap_or_default();

    RenderSpec {
        generation_id: generation_id.to_string(),
        width: OUTPUT_WIDTH,
        height: OUTPUT_HEIGHT,
        duration,
        slides,
        captions,
        audio,
        effects,
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct ComposeOrchestrator {
    scripts: ScriptGenerator,
    effects: EffectAnalyzer,
    images: ImageSourcer,
    music: MusicMatcher,
    engine: Arc<dyn RenderEngine>,
    poller: RenderJobPoller,
}

impl ComposeOrchestrator {
    pub fn new(
        scripts: ScriptGenerator,
        effects: EffectAnalyzer,
        images: ImageSourcer,
        music: MusicMatcher,
        engine: Arc<dyn RenderEngine>,
        poller: RenderJobPoller,
    ) -> Self {
        Self {
            scripts,
            effects,
            images,
            music,
            engine,
            poller,
        }
    }

    /// Generate the script and effect tags. May be re-run before rendering.
    pub async fn draft(&self, run: &mut ComposeRun) -> Result<(), PipelineError> {
        run.job.advance(ComposeStage::Drafting)?;
        let result = self.draft_inner(run).await;
        record(run, result)
    }

    async fn draft_inner(&self, run: &mut ComposeRun) -> Result<(), PipelineError> {
        let draft = self.scripts.generate(&run.request).await?;
        let effects = self
            .effects
            .analyze(&EffectRequest {
                prompt: run.request.prompt.clone(),
                bpm: Some(draft.suggested_bpm_range.center().round() as u32),
                vibe: Some(draft.vibe),
            })
            .await;

        run.job.vibe = Some(draft.vibe);
        run.job.bpm_range = Some(draft.suggested_bpm_range);
        tracing::info!(
            generation_id = %run.job.generation_id,
            vibe = draft.vibe.as_str(),
            lines = draft.script.lines.len(),
            keywords = draft.search_keywords.len(),
            effects_source = ?effects.source,
            "Draft ready",
        );
        run.draft = Some(draft);
        run.effects = Some(effects);
        Ok(())
    }

    /// Search and rank images for the draft's keywords.
    pub async fn source_images(&self, run: &mut ComposeRun) -> Result<(), PipelineError> {
        run.job.advance(ComposeStage::Sourcing)?;
        let result = self.source_inner(run).await;
        record(run, result)
    }

    async fn source_inner(&self, run: &mut ComposeRun) -> Result<(), PipelineError> {
        let draft = run.draft.as_ref().ok_or_else(|| missing("Drafting"))?;
        let keywords = if draft.search_keywords.is_empty() {
            run.effects.as_ref().map(|e| e.keywords.clone()).unwrap_or_default()
        } else {
            draft.search_keywords.clone()
        };
        run.candidates = self.images.find_candidates(&keywords).await?;
        run.job.selected_images = selected(&run.candidates);
        Ok(())
    }

    /// Pick and analyze a track that fits the draft's vibe and tempo.
    pub async fn match_music(&self, run: &mut ComposeRun) -> Result<(), PipelineError> {
        run.job.advance(ComposeStage::Matching)?;
        let result = self.match_inner(run).await;
        record(run, result)
    }

    async fn match_inner(&self, run: &mut ComposeRun) -> Result<(), PipelineError> {
        let draft = run.draft.as_ref().ok_or_else(|| missing("Drafting"))?;
        let matched = self
            .music
            .match_track(draft.vibe, draft.suggested_bpm_range, draft.script.total_duration)
            .await?;
        run.job.audio_asset_id = Some(matched.asset.id.clone());
        run.audio = Some(matched);
        Ok(())
    }

    /// Store the selected images, submit the render and poll it to the end.
    pub async fn render(
        &self,
        run: &mut ComposeRun,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<(), PipelineError> {
        run.job.advance(ComposeStage::Rendering)?;
        let result = self.render_inner(run, cancel, on_progress).await;
        record(run, result)
    }

    async fn render_inner(
        &self,
        run: &mut ComposeRun,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<(), PipelineError> {
        let draft = run.draft.as_ref().ok_or_else(|| missing("Drafting"))?;
        let images = self.images.materialize(&run.job.selected_images).await;
        if images.is_empty() {
            return Err(PipelineError::NoImages("no images selected".into()));
        }
        let spec = build_render_spec(
            &run.job.generation_id,
            &draft.script,
            &images,
            run.audio.as_ref(),
            run.effects.as_ref(),
        );

        let job_id = self.engine.submit(&spec).await?;
        run.job.render_job_id = Some(job_id.clone());
        run.job.render_status = Some(RenderStatus::Queued);

        match self.poller.poll(&job_id, cancel, on_progress).await {
            PollOutcome::Completed { output_url } => {
                run.job.complete(output_url)?;
                Ok(())
            }
            PollOutcome::Failed { error } => Err(PipelineError::RenderFailed(error)),
            PollOutcome::TimedOut { attempts } => Err(PipelineError::RenderTimedOut { attempts }),
            PollOutcome::Cancelled => {
                // Best effort; the run is cancelled either way.
                if let Err(e) = self.engine.cancel(&job_id).await {
                    tracing::warn!(job_id = %job_id, error = %e, "Failed to cancel render job");
                }
                Err(PipelineError::Cancelled)
            }
        }
    }

    /// All stages in order. The job ends `Completed` or `Failed`.
    pub async fn run(
        &self,
        run: &mut ComposeRun,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<(), PipelineError> {
        self.draft(run).await?;
        self.source_images(run).await?;
        self.match_music(run).await?;
        self.render(run, cancel, on_progress).await
    }
}

/// Mark the job failed on error and pass the result through.
fn record(run: &mut ComposeRun, result: Result<(), PipelineError>) -> Result<(), PipelineError> {
    if let Err(e) = &result {
        tracing::error!(
            generation_id = %run.job.generation_id,
            stage = ?run.job.stage,
            error = %e,
            "Compose stage failed",
        );
        run.job.fail(e.to_string());
    }
    result
}
