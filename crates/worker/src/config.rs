use std::path::PathBuf;
use std::time::Duration;

use beatcut_pipeline::image_cache::ImageCacheConfig;
use beatcut_render::poller::PollConfig;
use beatcut_storage::StorageBackendType;

/// Worker configuration loaded from environment variables.
///
/// Provider credentials are optional so the worker can run cache
/// maintenance alone; a compose run fails fast when one it needs is missing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub google_search_api_key: Option<String>,
    pub google_search_cx: Option<String>,
    pub render_api_url: String,
    pub storage_backend: StorageBackendType,
    pub s3_bucket: Option<String>,
    pub s3_public_base_url: Option<String>,
    pub local_storage_dir: PathBuf,
    pub local_storage_base_url: String,
    pub audio_catalog_path: Option<PathBuf>,
    pub search_cache_ttl_hours: i64,
    pub image_cache_max_age_days: i64,
    pub image_cache_min_hits: i32,
    pub cache_cleanup_interval_secs: u64,
    pub render_poll_interval_ms: u64,
    pub render_poll_max_attempts: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                        |
    /// |-------------------------------|--------------------------------|
    /// | `DATABASE_URL`                | required                       |
    /// | `GEMINI_API_KEY`              | unset                          |
    /// | `GEMINI_MODEL`                | `gemini-2.0-flash`             |
    /// | `GOOGLE_SEARCH_API_KEY`       | unset                          |
    /// | `GOOGLE_SEARCH_CX`            | unset                          |
    /// | `RENDER_API_URL`              | `http://localhost:8100`        |
    /// | `STORAGE_BACKEND`             | `local`                        |
    /// | `S3_BUCKET`                   | unset (required for `s3`)      |
    /// | `S3_PUBLIC_BASE_URL`          | bucket virtual-host URL        |
    /// | `LOCAL_STORAGE_DIR`           | `./data/media`                 |
    /// | `LOCAL_STORAGE_BASE_URL`      | `http://localhost:8080/media`  |
    /// | `AUDIO_CATALOG_PATH`          | unset                          |
    /// | `SEARCH_CACHE_TTL_HOURS`      | `24`                           |
    /// | `IMAGE_CACHE_MAX_AGE_DAYS`    | `30`                           |
    /// | `IMAGE_CACHE_MIN_HITS`        | `2`                            |
    /// | `CACHE_CLEANUP_INTERVAL_SECS` | `3600`                         |
    /// | `RENDER_POLL_INTERVAL_MS`     | `2000`                         |
    /// | `RENDER_POLL_MAX_ATTEMPTS`    | `300`                          |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    ///
    /// Panics on a missing `DATABASE_URL` or a malformed value; a
    /// misconfigured worker should not start.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let database_url = get("DATABASE_URL").expect("DATABASE_URL must be set");

        let storage_backend = StorageBackendType::from_name(&or("STORAGE_BACKEND", "local"))
            .expect("STORAGE_BACKEND must be 'local' or 's3'");

        Self {
            database_url,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: or("GEMINI_MODEL", beatcut_llm::gemini::DEFAULT_MODEL),
            google_search_api_key: get("GOOGLE_SEARCH_API_KEY"),
            google_search_cx: get("GOOGLE_SEARCH_CX"),
            render_api_url: or("RENDER_API_URL", "http://localhost:8100"),
            storage_backend,
            s3_bucket: get("S3_BUCKET"),
            s3_public_base_url: get("S3_PUBLIC_BASE_URL"),
            local_storage_dir: PathBuf::from(or("LOCAL_STORAGE_DIR", "./data/media")),
            local_storage_base_url: or("LOCAL_STORAGE_BASE_URL", "http://localhost:8080/media"),
            audio_catalog_path: get("AUDIO_CATALOG_PATH").map(PathBuf::from),
            search_cache_ttl_hours: or("SEARCH_CACHE_TTL_HOURS", "24")
                .parse()
                .expect("SEARCH_CACHE_TTL_HOURS must be a valid i64"),
            image_cache_max_age_days: or("IMAGE_CACHE_MAX_AGE_DAYS", "30")
                .parse()
                .expect("IMAGE_CACHE_MAX_AGE_DAYS must be a valid i64"),
            image_cache_min_hits: or("IMAGE_CACHE_MIN_HITS", "2")
                .parse()
                .expect("IMAGE_CACHE_MIN_HITS must be a valid i32"),
            cache_cleanup_interval_secs: or("CACHE_CLEANUP_INTERVAL_SECS", "3600")
                .parse()
                .expect("CACHE_CLEANUP_INTERVAL_SECS must be a valid u64"),
            render_poll_interval_ms: or("RENDER_POLL_INTERVAL_MS", "2000")
                .parse()
                .expect("RENDER_POLL_INTERVAL_MS must be a valid u64"),
            render_poll_max_attempts: or("RENDER_POLL_MAX_ATTEMPTS", "300")
                .parse()
                .expect("RENDER_POLL_MAX_ATTEMPTS must be a valid u32"),
        }
    }

    pub fn image_cache_config(&self) -> ImageCacheConfig {
        ImageCacheConfig {
            search_ttl_hours: self.search_cache_ttl_hours,
            max_age_days: self.image_cache_max_age_days,
            min_hit_count: self.image_cache_min_hits,
            ..ImageCacheConfig::default()
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.render_poll_interval_ms),
            max_attempts: self.render_poll_max_attempts,
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache_cleanup_interval_secs.max(1))
    }
}
