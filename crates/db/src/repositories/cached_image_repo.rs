//! Repository for the `cached_images` table.

use beatcut_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::cached_image::{CachedImage, CachedImageStats, UpsertCachedImage};

/// Column list for cached_images queries.
const COLUMNS: &str = "id, source_url, source_url_hash, content_hash, storage_url, storage_key, \
    mime_type, width, height, file_size, hit_count, last_used_at, created_at, updated_at";

/// Provides data access for the image cache.
pub struct CachedImageRepo;

impl CachedImageRepo {
    /// Find the row registered for a normalized-URL hash.
    pub async fn find_by_url_hash(
        pool: &PgPool,
        source_url_hash: &str,
    ) -> Result<Option<CachedImage>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM cached_images WHERE source_url_hash = $1");
        sqlx::query_as::<_, CachedImage>(&query)
            .bind(source_url_hash)
            .fetch_optional(pool)
            .await
    }

    /// Find any row holding the given content. The most recently used row
    /// wins when several URLs share the same bytes.
    pub async fn find_by_content_hash(
        pool: &PgPool,
        content_hash: &str,
    ) -> Result<Option<CachedImage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM cached_images
             WHERE content_hash = $1
             ORDER BY last_used_at DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, CachedImage>(&query)
            .bind(content_hash)
            .fetch_optional(pool)
            .await
    }

    /// Insert or repoint the row for `source_url_hash`.
    pub async fn upsert(
        pool: &PgPool,
        input: &UpsertCachedImage,
    ) -> Result<CachedImage, sqlx::Error> {
        let query = format!(
            "INSERT INTO cached_images
                (source_url, source_url_hash, content_hash, storage_url, storage_key,
                 mime_type, width, height, file_size, hit_count, last_used_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, NOW())
             ON CONFLICT (source_url_hash) DO UPDATE SET
                source_url = EXCLUDED.source_url,
                content_hash = EXCLUDED.content_hash,
                storage_url = EXCLUDED.storage_url,
                storage_key = EXCLUDED.storage_key,
                mime_type = EXCLUDED.mime_type,
                width = EXCLUDED.width,
                height = EXCLUDED.height,
                file_size = EXCLUDED.file_size,
                last_used_at = NOW(),
                updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CachedImage>(&query)
            .bind(&input.source_url)
            .bind(&input.source_url_hash)
            .bind(&input.content_hash)
            .bind(&input.storage_url)
            .bind(&input.storage_key)
            .bind(&input.mime_type)
            .bind(input.width)
            .bind(input.height)
            .bind(input.file_size)
            .fetch_one(pool)
            .await
    }

    /// Bump the hit counter and last-used time for a row.
    pub async fn record_hit(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE cached_images
             SET hit_count = hit_count + 1, last_used_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete rows unused since `cutoff` that were hit fewer than
    /// `min_hit_count` times. Returns the number of deleted rows.
    pub async fn delete_stale(
        pool: &PgPool,
        cutoff: Timestamp,
        min_hit_count: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM cached_images
             WHERE last_used_at < $1 AND hit_count < $2",
        )
        .bind(cutoff)
        .bind(min_hit_count)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Aggregate counters across the whole table.
    pub async fn stats(pool: &PgPool) -> Result<CachedImageStats, sqlx::Error> {
        sqlx::query_as::<_, CachedImageStats>(
            "SELECT
                COUNT(*) AS total_rows,
                COUNT(DISTINCT content_hash) AS unique_objects,
                COALESCE(SUM(hit_count), 0)::BIGINT AS total_hits,
                COALESCE(SUM(file_size), 0)::BIGINT AS total_bytes
             FROM cached_images",
        )
        .fetch_one(pool)
        .await
    }
}
