//! Cancellable render status polling.
//!
//! [`RenderJobPoller::poll`] calls [`RenderEngine::status`] every
//! `interval` until the job reaches a terminal status, `max_attempts`
//! polls have been made, or the [`CancellationToken`] fires. A failed
//! status call still uses up an attempt; polling carries on after it.
//! Running out of attempts is reported as [`PollOutcome::TimedOut`],
//! not as an error.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use beatcut_core::compose::RenderStatus;

use crate::engine::RenderEngine;
use crate::events::RenderProgress;

/// Polling cadence and limit.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 300,
        }
    }
}

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed { output_url: Option<String> },
    /// The engine reported failure; `error` is its message, verbatim.
    Failed { error: String },
    TimedOut { attempts: u32 },
    Cancelled,
}

#[derive(Debug)]
enum PollState {
    Polling { attempts: u32 },
    Done(PollOutcome),
}

/// Callback invoked with every successful status snapshot.
pub type ProgressCallback<'a> = &'a (dyn Fn(&RenderProgress) + Send + Sync);

pub struct RenderJobPoller {
    engine: Arc<dyn RenderEngine>,
    config: PollConfig,
}

impl RenderJobPoller {
    pub fn new(engine: Arc<dyn RenderEngine>, config: PollConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub async fn poll(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> PollOutcome {
        let mut state = PollState::Polling { attempts: 0 };

        loop {
            state = match state {
                PollState::Done(outcome) => {
                    log_outcome(job_id, &outcome);
                    return outcome;
                }
                PollState::Polling { attempts } => {
                    self.step(job_id, attempts, cancel, on_progress).await
                }
            };
        }
    }

    /// One poll attempt followed, if still polling, by the inter-poll sleep.
    async fn step(
        &self,
        job_id: &str,
        attempts: u32,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> PollState {
        if cancel.is_cancelled() {
            return PollState::Done(PollOutcome::Cancelled);
        }
        if attempts >= self.config.max_attempts {
            return PollState::Done(PollOutcome::TimedOut { attempts });
        }
        let attempt = attempts + 1;

        let result = tokio::select! {
            _ = cancel.cancelled() => return PollState::Done(PollOutcome::Cancelled),
            result = self.engine.status(job_id) => result,
        };

        match result {
            Ok(status) => {
                tracing::debug!(
                    job_id,
                    attempt,
                    status = ?status.status,
                    progress = status.progress,
                    "Render status",
                );
                if let Some(callback) = on_progress {
                    callback(&RenderProgress {
                        job_id: job_id.to_string(),
                        attempt,
                        status: status.status,
                        progress: status.progress,
                        current_step: status.current_step.clone(),
                    });
                }
                match status.status {
                    RenderStatus::Completed => {
                        return PollState::Done(PollOutcome::Completed {
                            output_url: status.output_url,
                        });
                    }
                    RenderStatus::Failed => {
                        return PollState::Done(PollOutcome::Failed {
                            error: status
                                .error
                                .unwrap_or_else(|| "render failed".to_string()),
                        });
                    }
                    RenderStatus::Queued | RenderStatus::Processing => {}
                }
            }
            Err(e) => {
                tracing::warn!(job_id, attempt, error = %e, "Render status call failed");
            }
        }

        if attempt >= self.config.max_attempts {
            return PollState::Done(PollOutcome::TimedOut { attempts: attempt });
        }

        tokio::select! {
            _ = cancel.cancelled() => PollState::Done(PollOutcome::Cancelled),
            _ = tokio::time::sleep(self.config.interval) => PollState::Polling { attempts: attempt },
        }
    }
}

fn log_outcome(job_id: &str, outcome: &PollOutcome) {
    match outcome {
        PollOutcome::Completed { output_url } => {
            tracing::info!(job_id, output_url = ?output_url, "Render completed");
        }
        PollOutcome::Failed { error } => {
            tracing::error!(job_id, error = %error, "Render failed");
        }
        PollOutcome::TimedOut { attempts } => {
            tracing::warn!(job_id, attempts, "Render polling timed out");
        }
        PollOutcome::Cancelled => {
            tracing::info!(job_id, "Render polling cancelled");
        }
    }
}
