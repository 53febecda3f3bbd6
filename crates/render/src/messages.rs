//! Render job request and status payloads.
//!
//! The engine accepts a [`RenderSpec`] describing a vertical slideshow
//! (timed slides, captions, an audio track with a start offset and an
//! effect preset) and reports progress as [`StatusResponse`].

use serde::{Deserialize, Serialize};

use beatcut_core::compose::{clamp_progress, RenderStatus};

/// One image shown for `duration` seconds starting at `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub image_url: String,
    pub start: f64,
    pub duration: f64,
}

/// A caption overlay timed against the clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caption {
    pub text: String,
    pub start: f64,
    pub duration: f64,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    pub url: String,
    /// Seconds into the source track where playback begins.
    pub start_offset: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectPreset {
    pub effects: Vec<String>,
    pub transitions: Vec<String>,
    pub color_grade: String,
}

/// Everything the engine needs to produce one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSpec {
    pub generation_id: String,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub slides: Vec<Slide>,
    pub captions: Vec<Caption>,
    pub audio: Option<AudioTrack>,
    pub effects: EffectPreset,
}

/// Response from `POST /jobs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
}

/// Response from `GET /jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: RenderStatus,
    #[serde(default)]
    pub progress: f64,
    pub current_step: Option<String>,
    pub output_url: Option<String>,
    pub error: Option<String>,
}

/// Engine-neutral status with progress already clamped to `0..=100`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub status: RenderStatus,
    pub progress: u8,
    pub current_step: Option<String>,
    pub output_url: Option<String>,
    pub error: Option<String>,
}

impl From<StatusResponse> for JobStatus {
    fn from(r: StatusResponse) -> Self {
        Self {
            status: r.status,
            progress: clamp_progress(r.progress),
            current_step: r.current_step,
            output_url: r.output_url,
            error: r.error,
        }
    }
}
