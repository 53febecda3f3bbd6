//! Wiring of concrete providers from [`WorkerConfig`].

use std::sync::Arc;

use anyhow::Context;

use beatcut_db::DbPool;
use beatcut_llm::gemini::GeminiClient;
use beatcut_llm::LanguageModel;
use beatcut_pipeline::audio_analyzer::AudioAnalyzer;
use beatcut_pipeline::cache_store::PgImageCacheStore;
use beatcut_pipeline::effect_analyzer::EffectAnalyzer;
use beatcut_pipeline::image_cache::ImageCache;
use beatcut_pipeline::music::{MusicMatcher, StaticAudioLibrary};
use beatcut_pipeline::script_generator::ScriptGenerator;
use beatcut_pipeline::sourcing::{GoogleImageSearch, HttpImageFetcher, ImageSourcer};
use beatcut_pipeline::ComposeOrchestrator;
use beatcut_render::api::RenderApi;
use beatcut_render::engine::RenderEngine;
use beatcut_render::poller::RenderJobPoller;
use beatcut_storage::{LocalObjectStore, ObjectStore, S3ObjectStore, StorageBackendType};

use crate::config::WorkerConfig;

pub async fn object_store(config: &WorkerConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config.storage_backend {
        StorageBackendType::Local => Arc::new(LocalObjectStore::new(
            config.local_storage_dir.clone(),
            config.local_storage_base_url.clone(),
        )),
        StorageBackendType::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .context("S3_BUCKET must be set when STORAGE_BACKEND=s3")?;
            Arc::new(S3ObjectStore::from_env(bucket, config.s3_public_base_url.clone()).await)
        }
    };
    tracing::info!(backend = config.storage_backend.name(), "Object storage ready");
    Ok(store)
}

pub fn image_cache(config: &WorkerConfig, pool: DbPool, objects: Arc<dyn ObjectStore>) -> Arc<ImageCache> {
    Arc::new(ImageCache::new(
        Arc::new(PgImageCacheStore::new(pool)),
        objects,
        Arc::new(HttpImageFetcher::default()),
        config.image_cache_config(),
    ))
}

/// Build the full compose pipeline. Fails when a provider it needs is not
/// configured.
pub async fn orchestrator(config: &WorkerConfig, cache: Arc<ImageCache>) -> anyhow::Result<ComposeOrchestrator> {
    let api_key = config
        .gemini_api_key
        .clone()
        .context("GEMINI_API_KEY must be set to compose")?;
    let model: Arc<dyn LanguageModel> = Arc::new(GeminiClient::new(api_key, config.gemini_model.clone()));

    let search_key = config
        .google_search_api_key
        .clone()
        .context("GOOGLE_SEARCH_API_KEY must be set to compose")?;
    let search_cx = config
        .google_search_cx
        .clone()
        .context("GOOGLE_SEARCH_CX must be set to compose")?;
    let images = ImageSourcer::new(cache, Arc::new(GoogleImageSearch::new(search_key, search_cx)));

    let catalog = config
        .audio_catalog_path
        .as_deref()
        .context("AUDIO_CATALOG_PATH must be set to compose")?;
    let library = StaticAudioLibrary::from_path(catalog)
        .await
        .with_context(|| format!("Failed to load audio catalog {}", catalog.display()))?;
    let music = MusicMatcher::new(Arc::new(library), Arc::new(AudioAnalyzer::default()));

    let engine: Arc<dyn RenderEngine> = Arc::new(RenderApi::new(config.render_api_url.clone()));
    let poller = RenderJobPoller::new(Arc::clone(&engine), config.poll_config());

    tracing::info!(
        model = %config.gemini_model,
        render_api = %config.render_api_url,
        "Compose pipeline ready",
    );

    Ok(ComposeOrchestrator::new(
        ScriptGenerator::new(Arc::clone(&model)),
        EffectAnalyzer::with_model(model),
        images,
        music,
        engine,
        poller,
    ))
}
