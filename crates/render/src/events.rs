//! Progress events emitted while a render job is polled.

use serde::Serialize;

use beatcut_core::compose::RenderStatus;

/// Snapshot delivered to the poller's progress callback after every
/// successful status call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderProgress {
    pub job_id: String,
    /// 1-based poll attempt that produced this snapshot.
    pub attempt: u32,
    pub status: RenderStatus,
    /// Completion percentage (0-100).
    pub progress: u8,
    pub current_step: Option<String>,
}
