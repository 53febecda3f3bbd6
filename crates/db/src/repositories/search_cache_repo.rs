//! Repository for the `search_cache_entries` table.

use sqlx::PgPool;

use crate::models::search_cache::{SearchCacheEntry, SearchCacheStats, UpsertSearchCache};

/// Column list for search_cache_entries queries.
const COLUMNS: &str = "id, cache_key, query, results, result_count, hit_count, \
    expires_at, created_at, updated_at";

/// Provides data access for the search result cache.
pub struct SearchCacheRepo;

impl SearchCacheRepo {
    /// Find an entry by key, ignoring entries that have expired.
    pub async fn find_live(
        pool: &PgPool,
        cache_key: &str,
    ) -> Result<Option<SearchCacheEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM search_cache_entries
             WHERE cache_key = $1 AND expires_at > NOW()"
        );
        sqlx::query_as::<_, SearchCacheEntry>(&query)
            .bind(cache_key)
            .fetch_optional(pool)
            .await
    }

    /// Insert or refresh an entry. Refreshing resets the hit counter and
    /// pushes `expires_at` to `NOW() + ttl_hours`.
    pub async fn upsert(
        pool: &PgPool,
        input: &UpsertSearchCache,
    ) -> Result<SearchCacheEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO search_cache_entries
                (cache_key, query, results, result_count, hit_count, expires_at)
             VALUES ($1, $2, $3, $4, 0, NOW() + make_interval(hours => $5::INT))
             ON CONFLICT (cache_key) DO UPDATE SET
                query = EXCLUDED.query,
                results = EXCLUDED.results,
                result_count = EXCLUDED.result_count,
                hit_count = 0,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SearchCacheEntry>(&query)
            .bind(&input.cache_key)
            .bind(&input.query)
            .bind(&input.results)
            .bind(input.result_count)
            .bind(input.ttl_hours)
            .fetch_one(pool)
            .await
    }

    /// Bump the hit counter for a key.
    pub async fn record_hit(pool: &PgPool, cache_key: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE search_cache_entries
             SET hit_count = hit_count + 1
             WHERE cache_key = $1",
        )
        .bind(cache_key)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete all expired entries. Returns the number of deleted rows.
    pub async fn delete_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM search_cache_entries WHERE expires_at <= NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Aggregate counters across the whole table.
    pub async fn stats(pool: &PgPool) -> Result<SearchCacheStats, sqlx::Error> {
        sqlx::query_as::<_, SearchCacheStats>(
            "SELECT
                COUNT(*) AS total_rows,
                COUNT(*) FILTER (WHERE expires_at > NOW()) AS live_rows,
                COUNT(*) FILTER (WHERE expires_at <= NOW()) AS expired_rows,
                COALESCE(SUM(hit_count), 0)::BIGINT AS total_hits
             FROM search_cache_entries",
        )
        .fetch_one(pool)
        .await
    }
}
