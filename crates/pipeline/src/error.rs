use beatcut_core::error::CoreError;
use beatcut_llm::LlmError;
use beatcut_render::api::RenderApiError;

use crate::music::MusicError;

/// Errors that reach the caller of the compose pipeline.
///
/// Everything with a defined fallback (cache, grounding, deep audio
/// analysis, effect model) is handled inside the components and never
/// shows up here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Script generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Model returned an unusable script: {0}")]
    InvalidScript(String),

    #[error("Render submission failed: {0}")]
    RenderSubmit(#[from] RenderApiError),

    /// Engine-reported failure, message passed through unchanged.
    #[error("{0}")]
    RenderFailed(String),

    #[error("render timed out after {attempts} status checks")]
    RenderTimedOut { attempts: u32 },

    #[error("Compose run was cancelled")]
    Cancelled,

    #[error("Audio library error: {0}")]
    Music(#[from] MusicError),

    #[error("No audio track matches vibe {vibe} and {min}-{max} BPM")]
    NoAudioMatch { vibe: String, min: u32, max: u32 },

    #[error("No usable images found for keywords: {0}")]
    NoImages(String),
}
