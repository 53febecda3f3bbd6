//! Search cache model.

use beatcut_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `search_cache_entries` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SearchCacheEntry {
    pub id: DbId,
    pub cache_key: String,
    pub query: String,
    pub results: serde_json::Value,
    pub result_count: i32,
    pub hit_count: i32,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for storing fresh search results.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertSearchCache {
    pub cache_key: String,
    pub query: String,
    pub results: serde_json::Value,
    pub result_count: i32,
    pub ttl_hours: i64,
}

/// Aggregate counters for the search cache.
#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct SearchCacheStats {
    pub total_rows: i64,
    pub live_rows: i64,
    pub expired_rows: i64,
    pub total_hits: i64,
}
