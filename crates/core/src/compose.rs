//! Compose job lifecycle: stages, transitions and render status.
//!
//! ```text
//! Drafting -> Sourcing -> Matching -> Rendering -> Completed
//!     ^          |  ^         |             \---> Failed
//!     |----------|  |---------|
//! ```
//!
//! Before `Rendering` a job may go back to `Sourcing` or re-run
//! `Drafting`. Once rendering starts the job only moves to a terminal
//! state. Any non-terminal stage may fail.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::script::{BpmRange, Vibe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeStage {
    Drafting,
    Sourcing,
    Matching,
    Rendering,
    Completed,
    Failed,
}

impl ComposeStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the job may still be edited (stages re-run, images changed).
    pub fn is_editable(self) -> bool {
        matches!(self, Self::Drafting | Self::Sourcing | Self::Matching)
    }
}

/// Whether `from -> to` is a legal stage transition.
pub fn can_transition(from: ComposeStage, to: ComposeStage) -> bool {
    use ComposeStage::*;
    match (from, to) {
        (_, Failed) => !from.is_terminal(),
        (Drafting, Drafting | Sourcing) => true,
        (Sourcing, Drafting | Sourcing | Matching) => true,
        (Matching, Drafting | Sourcing | Matching | Rendering) => true,
        (Rendering, Completed) => true,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Render status
// ---------------------------------------------------------------------------

/// Status reported by the render engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RenderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Clamp an engine-reported progress value into `0..=100`.
pub fn clamp_progress(progress: f64) -> u8 {
    if !progress.is_finite() {
        return 0;
    }
    progress.round().clamp(0.0, 100.0) as u8
}

// ---------------------------------------------------------------------------
// Image candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCandidate {
    pub id: String,
    pub source_url: String,
    pub thumbnail_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality_score: f64,
    pub is_selected: bool,
    pub sort_order: u32,
}

/// Short side at which an image earns the full resolution score.
const FULL_SCORE_SHORT_SIDE: f64 = 1080.0;

/// Score an image for use in a vertical slideshow: resolution up to 0.8,
/// plus up to 0.2 for portrait orientation. Unknown dimensions score 0.3.
pub fn image_quality_score(width: Option<u32>, height: Option<u32>) -> f64 {
    let (Some(w), Some(h)) = (width, height) else {
        return 0.3;
    };
    if w == 0 || h == 0 {
        return 0.0;
    }
    let short_side = w.min(h) as f64;
    let resolution = (short_side / FULL_SCORE_SHORT_SIDE).min(1.0) * 0.8;
    let aspect = h as f64 / w as f64;
    let orientation = if aspect >= 1.5 {
        0.2
    } else if aspect >= 1.0 {
        0.1
    } else {
        0.0
    };
    resolution + orientation
}

// ---------------------------------------------------------------------------
// Compose job
// ---------------------------------------------------------------------------

/// State of one compose run, mutated as stages complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeJob {
    pub generation_id: String,
    pub campaign_id: String,
    pub stage: ComposeStage,
    pub vibe: Option<Vibe>,
    pub bpm_range: Option<BpmRange>,
    pub selected_images: Vec<ImageCandidate>,
    pub audio_asset_id: Option<String>,
    pub render_job_id: Option<String>,
    pub render_status: Option<RenderStatus>,
    pub progress: u8,
    pub output_url: Option<String>,
    pub error: Option<String>,
}

impl ComposeJob {
    pub fn new(generation_id: impl Into<String>, campaign_id: impl Into<String>) -> Self {
        Self {
            generation_id: generation_id.into(),
            campaign_id: campaign_id.into(),
            stage: ComposeStage::Drafting,
            vibe: None,
            bpm_range: None,
            selected_images: Vec::new(),
            audio_asset_id: None,
            render_job_id: None,
            render_status: None,
            progress: 0,
            output_url: None,
            error: None,
        }
    }

    /// Move to `to`, rejecting illegal transitions with a conflict.
    pub fn advance(&mut self, to: ComposeStage) -> Result<(), CoreError> {
        if !can_transition(self.stage, to) {
            return Err(CoreError::Conflict(format!(
                "Compose job {} cannot move from {:?} to {:?}",
                self.generation_id, self.stage, to
            )));
        }
        self.stage = to;
        Ok(())
    }

    /// Require that the job is still editable.
    pub fn ensure_editable(&self) -> Result<(), CoreError> {
        if self.stage.is_editable() {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Compose job {} is {:?} and can no longer be changed",
                self.generation_id, self.stage
            )))
        }
    }

    /// Record a failure. Terminal jobs keep their first outcome.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = ComposeStage::Failed;
        self.error = Some(error.into());
        if self.render_status.is_some() {
            self.render_status = Some(RenderStatus::Failed);
        }
    }

    pub fn complete(&mut self, output_url: Option<String>) -> Result<(), CoreError> {
        self.advance(ComposeStage::Completed)?;
        self.render_status = Some(RenderStatus::Completed);
        self.progress = 100;
        self.output_url = output_url;
        Ok(())
    }
}
