//! Content-addressable image cache and search-result cache.
//!
//! Images are looked up first by the hash of their normalized source URL,
//! then (once bytes are in hand) by the SHA-256 of their content. Objects
//! are stored once per content hash under `images/<hash>.<ext>`; any
//! number of source URLs may point at the same object.
//!
//! Search results are cached under a digest of the normalized keyword set
//! and search parameters with a TTL.
//!
//! The cache never fails its caller. Persistence errors are logged and
//! treated as a miss, storage errors fall back to the original URL, and hit
//! counters are bumped from spawned tasks nobody waits on.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;

use beatcut_core::cache_keys::{image_url_hash, normalize_keywords, search_cache_key, search_query, SearchParams};
use beatcut_core::hashing::sha256_hex;
use beatcut_core::types::DbId;
use beatcut_db::models::cached_image::{CachedImage, UpsertCachedImage};
use beatcut_db::models::search_cache::UpsertSearchCache;
use beatcut_storage::ObjectStore;

use crate::cache_store::{CacheStats, ImageCacheStore};
use crate::sourcing::{
    image_dimensions, ImageFetcher, ImageSearchProvider, ImageSearchResult, SourcingError,
};

#[derive(Debug, Clone)]
pub struct ImageCacheConfig {
    pub search_ttl_hours: i64,
    /// Image rows unused for this long become eligible for cleanup...
    pub max_age_days: i64,
    /// ...unless they have at least this many hits.
    pub min_hit_count: i32,
    /// Images cached concurrently by [`ImageCache::cache_images`].
    pub batch_size: usize,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            search_ttl_hours: 24,
            max_age_days: 30,
            min_hit_count: 2,
            batch_size: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedSearch {
    pub cache_key: String,
    pub results: Vec<ImageSearchResult>,
    pub from_cache: bool,
}

/// Outcome of caching one image. `url` is always usable: the stored copy
/// when `cached`, otherwise the original source URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedImageResult {
    pub source_url: String,
    pub url: String,
    pub cached: bool,
    pub content_hash: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl CachedImageResult {
    fn uncached(source_url: &str) -> Self {
        Self {
            source_url: source_url.to_string(),
            url: source_url.to_string(),
            cached: false,
            content_hash: None,
            width: None,
            height: None,
        }
    }

    fn from_row(source_url: &str, row: &CachedImage) -> Self {
        Self {
            source_url: source_url.to_string(),
            url: row.storage_url.clone(),
            cached: true,
            content_hash: Some(row.content_hash.clone()),
            width: row.width.and_then(|w| u32::try_from(w).ok()),
            height: row.height.and_then(|h| u32::try_from(h).ok()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub expired_searches: u64,
    pub stale_images: u64,
}

/// File extension for a stored image.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        _ => "bin",
    }
}

/// Storage key for an image with the given content hash.
pub fn storage_key(content_hash: &str, mime_type: &str) -> String {
    format!("images/{content_hash}.{}", extension_for_mime(mime_type))
}

pub struct ImageCache {
    store: Arc<dyn ImageCacheStore>,
    objects: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn ImageFetcher>,
    config: ImageCacheConfig,
}

impl ImageCache {
    pub fn new(
        store: Arc<dyn ImageCacheStore>,
        objects: Arc<dyn ObjectStore>,
        fetcher: Arc<dyn ImageFetcher>,
        config: ImageCacheConfig,
    ) -> Self {
        Self {
            store,
            objects,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &ImageCacheConfig {
        &self.config
    }

    // ---- search cache ----

    /// Live cached results for a keyword set, if any.
    pub async fn get_cached_search<S: AsRef<str> + Sync>(
        &self,
        keywords: &[S],
        params: &SearchParams,
    ) -> Option<Vec<ImageSearchResult>> {
        let cache_key = search_cache_key(keywords, params);
        let entry = match self.store.find_live_search(&cache_key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(cache_key = %cache_key, error = %e, "Search cache lookup failed");
                return None;
            }
        };

        let results: Vec<ImageSearchResult> = match serde_json::from_value(entry.results) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(cache_key = %cache_key, error = %e, "Discarding unreadable search cache entry");
                return None;
            }
        };

        self.spawn_search_hit(cache_key);
        Some(results)
    }

    /// Store fresh results with a TTL of `search_ttl_hours`.
    pub async fn cache_search_results<S: AsRef<str> + Sync>(
        &self,
        keywords: &[S],
        params: &SearchParams,
        results: &[ImageSearchResult],
    ) {
        let cache_key = search_cache_key(keywords, params);
        let payload = match serde_json::to_value(results) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Could not serialize search results for caching");
                return;
            }
        };
        let input = UpsertSearchCache {
            cache_key: cache_key.clone(),
            query: normalize_keywords(keywords).join(" "),
            results: payload,
            result_count: i32::try_from(results.len()).unwrap_or(i32::MAX),
            ttl_hours: self.config.search_ttl_hours,
        };
        if let Err(e) = self.store.upsert_search(&input).await {
            tracing::warn!(cache_key = %cache_key, error = %e, "Search cache write failed");
        }
    }

    /// Serve a keyword set from the cache, or search live and cache the
    /// answer.
    pub async fn search_with_cache<S: AsRef<str> + Sync>(
        &self,
        keywords: &[S],
        params: &SearchParams,
        provider: &dyn ImageSearchProvider,
    ) -> Result<CachedSearch, SourcingError> {
        let cache_key = search_cache_key(keywords, params);
        if let Some(results) = self.get_cached_search(keywords, params).await {
            tracing::debug!(cache_key = %cache_key, results = results.len(), "Search cache hit");
            return Ok(CachedSearch {
                cache_key,
                results,
                from_cache: true,
            });
        }

        let query = search_query(keywords);
        let results = provider.search(&query, params).await?;
        tracing::debug!(cache_key = %cache_key, query = %query, results = results.len(), "Live image search");

        self.cache_search_results(keywords, params, &results).await;
        Ok(CachedSearch {
            cache_key,
            results,
            from_cache: false,
        })
    }

    // ---- image cache ----

    /// Look an image up by source URL, then by content when `content` is
    /// given. A content match registers `url` against the existing object.
    pub async fn get_or_check_image(&self, url: &str, content: Option<&[u8]>) -> Option<CachedImage> {
        let url_hash = image_url_hash(url);
        if let Some(row) = self.lookup_url(&url_hash).await {
            return Some(row);
        }
        let bytes = content?;
        let content_hash = sha256_hex(bytes);
        self.lookup_content(url, &url_hash, &content_hash, bytes).await
    }

    /// Return a stored copy of `url`, fetching and storing it if needed.
    pub async fn cache_image(&self, url: &str) -> CachedImageResult {
        let url_hash = image_url_hash(url);
        if let Some(row) = self.lookup_url(&url_hash).await {
            return CachedImageResult::from_row(url, &row);
        }

        let fetched = match self.fetcher.fetch(url).await {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(url, error = %e, "Image fetch failed, using source URL");
                return CachedImageResult::uncached(url);
            }
        };

        let content_hash = sha256_hex(&fetched.bytes);
        if let Some(row) = self
            .lookup_content(url, &url_hash, &content_hash, &fetched.bytes)
            .await
        {
            return CachedImageResult::from_row(url, &row);
        }

        let (width, height) = match (fetched.width, fetched.height) {
            (Some(w), Some(h)) => (Some(w), Some(h)),
            _ => image_dimensions(&fetched.bytes).unzip(),
        };
        let key = storage_key(&content_hash, &fetched.mime_type);
        let file_size = fetched.bytes.len() as i64;

        let storage_url = match self
            .objects
            .put(fetched.bytes, &key, &fetched.mime_type)
            .await
        {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(url, key = %key, error = %e, "Image upload failed, using source URL");
                return CachedImageResult::uncached(url);
            }
        };

        let input = UpsertCachedImage {
            source_url: url.to_string(),
            source_url_hash: url_hash,
            content_hash: content_hash.clone(),
            storage_url: storage_url.clone(),
            storage_key: key,
            mime_type: Some(fetched.mime_type),
            width: width.and_then(|w| i32::try_from(w).ok()),
            height: height.and_then(|h| i32::try_from(h).ok()),
            file_size,
        };
        match self.store.upsert_image(&input).await {
            Ok(row) => {
                tracing::debug!(url, content_hash = %row.content_hash, "Image cached");
                CachedImageResult::from_row(url, &row)
            }
            Err(e) => {
                // Object is stored; only the row is missing, so the next
                // lookup is a miss that re-registers it.
                tracing::warn!(url, error = %e, "Image cache row write failed");
                CachedImageResult {
                    source_url: url.to_string(),
                    url: storage_url,
                    cached: true,
                    content_hash: Some(content_hash),
                    width,
                    height,
                }
            }
        }
    }

    /// Cache `urls` in batches of `batch_size`. Each batch finishes before
    /// the next starts; results come back in input order.
    pub async fn cache_images(&self, urls: &[String]) -> Vec<CachedImageResult> {
        let mut results = Vec::with_capacity(urls.len());
        for batch in urls.chunks(self.config.batch_size.max(1)) {
            let batch_results = join_all(batch.iter().map(|url| self.cache_image(url))).await;
            results.extend(batch_results);
        }
        results
    }

    // ---- maintenance ----

    /// Delete expired search entries and stale, rarely used image rows.
    pub async fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        match self.store.delete_expired_searches().await {
            Ok(n) => report.expired_searches = n,
            Err(e) => tracing::warn!(error = %e, "Search cache cleanup failed"),
        }

        let cutoff = Utc::now() - chrono::Duration::days(self.config.max_age_days);
        match self
            .store
            .delete_stale_images(cutoff, self.config.min_hit_count)
            .await
        {
            Ok(n) => report.stale_images = n,
            Err(e) => tracing::warn!(error = %e, "Image cache cleanup failed"),
        }

        report
    }

    pub async fn stats(&self) -> Result<CacheStats, sqlx::Error> {
        self.store.stats().await
    }

    // ---- private helpers ----

    async fn lookup_url(&self, url_hash: &str) -> Option<CachedImage> {
        match self.store.find_image_by_url_hash(url_hash).await {
            Ok(Some(row)) => {
                self.spawn_image_hit(row.id);
                Some(row)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(url_hash, error = %e, "Image cache URL lookup failed");
                None
            }
        }
    }

    async fn lookup_content(
        &self,
        url: &str,
        url_hash: &str,
        content_hash: &str,
        bytes: &[u8],
    ) -> Option<CachedImage> {
        let existing = match self.store.find_image_by_content_hash(content_hash).await {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(content_hash, error = %e, "Image cache content lookup failed");
                return None;
            }
        };

        let (width, height) = match (existing.width, existing.height) {
            (Some(w), Some(h)) => (Some(w), Some(h)),
            _ => {
                let dims = image_dimensions(bytes);
                (
                    dims.and_then(|d| i32::try_from(d.0).ok()),
                    dims.and_then(|d| i32::try_from(d.1).ok()),
                )
            }
        };
        let input = UpsertCachedImage {
            source_url: url.to_string(),
            source_url_hash: url_hash.to_string(),
            content_hash: content_hash.to_string(),
            storage_url: existing.storage_url.clone(),
            storage_key: existing.storage_key.clone(),
            mime_type: existing.mime_type.clone(),
            width,
            height,
            file_size: bytes.len() as i64,
        };

        match self.store.upsert_image(&input).await {
            Ok(row) => {
                tracing::debug!(url, content_hash, "Registered URL against existing image");
                Some(row)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Could not register URL for cached image");
                Some(existing)
            }
        }
    }

    fn spawn_search_hit(&self, cache_key: String) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.record_search_hit(&cache_key).await {
                tracing::warn!(cache_key = %cache_key, error = %e, "Failed to record search cache hit");
            }
        });
    }

    fn spawn_image_hit(&self, id: DbId) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.record_image_hit(id).await {
                tracing::warn!(image_id = id, error = %e, "Failed to record image cache hit");
            }
        });
    }
}
