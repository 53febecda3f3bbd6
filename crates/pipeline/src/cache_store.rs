//! Persistence seam for the image and search caches.
//!
//! [`ImageCacheStore`] is what [`crate::image_cache::ImageCache`] talks to.
//! [`PgImageCacheStore`] implements it over the `beatcut-db` repositories,
//! wrapping every call in [`with_retry`] so dropped connections are retried
//! before an error is reported.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;

use beatcut_core::types::{DbId, Timestamp};
use beatcut_db::models::cached_image::{CachedImage, CachedImageStats, UpsertCachedImage};
use beatcut_db::models::search_cache::{SearchCacheEntry, SearchCacheStats, UpsertSearchCache};
use beatcut_db::repositories::{CachedImageRepo, SearchCacheRepo};
use beatcut_db::retry::{with_retry, RetryConfig};

/// Combined counters for both cache tables.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub images: CachedImageStats,
    pub searches: SearchCacheStats,
}

#[async_trait]
pub trait ImageCacheStore: Send + Sync {
    /// Entry for `cache_key` whose `expires_at` is still in the future.
    async fn find_live_search(&self, cache_key: &str)
        -> Result<Option<SearchCacheEntry>, sqlx::Error>;

    async fn upsert_search(&self, input: &UpsertSearchCache) -> Result<(), sqlx::Error>;

    async fn record_search_hit(&self, cache_key: &str) -> Result<(), sqlx::Error>;

    async fn find_image_by_url_hash(
        &self,
        source_url_hash: &str,
    ) -> Result<Option<CachedImage>, sqlx::Error>;

    async fn find_image_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<CachedImage>, sqlx::Error>;

    async fn upsert_image(&self, input: &UpsertCachedImage) -> Result<CachedImage, sqlx::Error>;

    async fn record_image_hit(&self, id: DbId) -> Result<(), sqlx::Error>;

    async fn delete_expired_searches(&self) -> Result<u64, sqlx::Error>;

    /// Delete image rows unused since `cutoff` with fewer than `min_hit_count` hits.
    async fn delete_stale_images(
        &self,
        cutoff: Timestamp,
        min_hit_count: i32,
    ) -> Result<u64, sqlx::Error>;

    async fn stats(&self) -> Result<CacheStats, sqlx::Error>;
}

pub struct PgImageCacheStore {
    pool: PgPool,
    retry: RetryConfig,
}

impl PgImageCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_retry_config(pool, RetryConfig::default())
    }

    pub fn with_retry_config(pool: PgPool, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl ImageCacheStore for PgImageCacheStore {
    async fn find_live_search(
        &self,
        cache_key: &str,
    ) -> Result<Option<SearchCacheEntry>, sqlx::Error> {
        with_retry(&self.retry, "search_cache.find_live", || {
            SearchCacheRepo::find_live(&self.pool, cache_key)
        })
        .await
    }

    async fn upsert_search(&self, input: &UpsertSearchCache) -> Result<(), sqlx::Error> {
        with_retry(&self.retry, "search_cache.upsert", || {
            SearchCacheRepo::upsert(&self.pool, input)
        })
        .await?;
        Ok(())
    }

    async fn record_search_hit(&self, cache_key: &str) -> Result<(), sqlx::Error> {
        with_retry(&self.retry, "search_cache.record_hit", || {
            SearchCacheRepo::record_hit(&self.pool, cache_key)
        })
        .await
    }

    async fn find_image_by_url_hash(
        &self,
        source_url_hash: &str,
    ) -> Result<Option<CachedImage>, sqlx::Error> {
        with_retry(&self.retry, "cached_images.find_by_url_hash", || {
            CachedImageRepo::find_by_url_hash(&self.pool, source_url_hash)
        })
        .await
    }

    async fn find_image_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<CachedImage>, sqlx::Error> {
        with_retry(&self.retry, "cached_images.find_by_content_hash", || {
            CachedImageRepo::find_by_content_hash(&self.pool, content_hash)
        })
        .await
    }

    async fn upsert_image(&self, input: &UpsertCachedImage) -> Result<CachedImage, sqlx::Error> {
        with_retry(&self.retry, "cached_images.upsert", || {
            CachedImageRepo::upsert(&self.pool, input)
        })
        .await
    }

    async fn record_image_hit(&self, id: DbId) -> Result<(), sqlx::Error> {
        with_retry(&self.retry, "cached_images.record_hit", || {
            CachedImageRepo::record_hit(&self.pool, id)
        })
        .await
    }

    async fn delete_expired_searches(&self) -> Result<u64, sqlx::Error> {
        with_retry(&self.retry, "search_cache.delete_expired", || {
            SearchCacheRepo::delete_expired(&self.pool)
        })
        .await
    }

    async fn delete_stale_images(
        &self,
        cutoff: Timestamp,
        min_hit_count: i32,
    ) -> Result<u64, sqlx::Error> {
        with_retry(&self.retry, "cached_images.delete_stale", || {
            CachedImageRepo::delete_stale(&self.pool, cutoff, min_hit_count)
        })
        .await
    }

    async fn stats(&self) -> Result<CacheStats, sqlx::Error> {
        let images = with_retry(&self.retry, "cached_images.stats", || {
            CachedImageRepo::stats(&self.pool)
        })
        .await?;
        let searches = with_retry(&self.retry, "search_cache.stats", || {
            SearchCacheRepo::stats(&self.pool)
        })
        .await?;
        Ok(CacheStats { images, searches })
    }
}
