use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beatcut_worker::cleanup::{self, CacheCleanup};
use beatcut_worker::config::WorkerConfig;
use beatcut_worker::oneshot::{self, ComposeFile};
use beatcut_worker::services;

/// How long shutdown waits for background tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beatcut_worker=debug,beatcut_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        storage = config.storage_backend.name(),
        cleanup_interval_secs = config.cache_cleanup_interval_secs,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = beatcut_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    beatcut_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    beatcut_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Caches ---
    let objects = services::object_store(&config).await?;
    let cache = services::image_cache(&config, pool, objects);

    // --- Shutdown wiring ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    // --- Cleanup loop ---
    let cleanup_job = CacheCleanup::new(cache.clone(), config.cleanup_interval());
    let cleanup_handle = tokio::spawn(cleanup_job.run(cancel.child_token()));

    // --- Work ---
    let failure = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            let file = ComposeFile::load(&path).await?;
            let orchestrator = services::orchestrator(&config, cache).await?;
            let run = oneshot::run_compose(&orchestrator, file, &cancel).await;
            println!("{}", serde_json::to_string_pretty(&run)?);
            cancel.cancel();
            run.job.error
        }
        None => {
            tracing::info!("No compose request given, running cache maintenance until shutdown");
            cancel.cancelled().await;
            None
        }
    };

    // --- Post-shutdown cleanup ---
    cleanup::join_with_grace("cache_cleanup", cleanup_handle, SHUTDOWN_GRACE).await;

    if let Some(error) = failure {
        anyhow::bail!("Compose run failed: {error}");
    }
    tracing::info!("Worker shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
