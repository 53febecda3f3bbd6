//! Periodic sweep of the image and search caches.
//!
//! Expired search entries and image rows that are both old and rarely hit
//! are deleted on a fixed interval until the worker shuts down. Stored
//! objects are left in place; other rows may still share them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use beatcut_pipeline::image_cache::{CleanupReport, ImageCache};

pub struct CacheCleanup {
    cache: Arc<ImageCache>,
    interval: Duration,
}

impl CacheCleanup {
    pub fn new(cache: Arc<ImageCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// One sweep, logged.
    pub async fn run_once(&self) -> CleanupReport {
        let report = self.cache.cleanup().await;
        if report.expired_searches > 0 || report.stale_images > 0 {
            tracing::info!(
                expired_searches = report.expired_searches,
                stale_images = report.stale_images,
                "Cache cleanup: purged rows",
            );
        } else {
            tracing::debug!("Cache cleanup: nothing to purge");
        }
        report
    }

    /// Sweep immediately, then every `interval`, until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let config = self.cache.config();
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            max_age_days = config.max_age_days,
            min_hit_count = config.min_hit_count,
            "Cache cleanup job started",
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Cache cleanup job stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.run_once().await;
                }
            }
        }
    }
}

/// How a background task ended at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// The task panicked or was aborted.
    Crashed,
    /// Still running after the grace period; it is left detached.
    TimedOut,
}

/// Wait up to `grace` for a spawned task and log anything but a clean stop.
pub async fn join_with_grace(name: &str, handle: JoinHandle<()>, grace: Duration) -> StopOutcome {
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(())) => {
            tracing::info!(task = name, "Background task stopped");
            StopOutcome::Stopped
        }
        Ok(Err(e)) => {
            tracing::warn!(task = name, error = %e, "Background task ended abnormally");
            StopOutcome::Crashed
        }
        Err(_) => {
            tracing::warn!(
                task = name,
                grace_secs = grace.as_secs(),
                "Background task did not stop in time, abandoning it",
            );
            StopOutcome::TimedOut
        }
    }
}
