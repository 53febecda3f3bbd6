//! Cached image model.

use beatcut_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `cached_images` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CachedImage {
    pub id: DbId,
    pub source_url: String,
    pub source_url_hash: String,
    pub content_hash: String,
    pub storage_url: String,
    pub storage_key: String,
    pub mime_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub file_size: i64,
    pub hit_count: i32,
    pub last_used_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering an image under a source URL.
///
/// Upserting an existing `source_url_hash` repoints the row at the new
/// storage object.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertCachedImage {
    pub source_url: String,
    pub source_url_hash: String,
    pub content_hash: String,
    pub storage_url: String,
    pub storage_key: String,
    pub mime_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub file_size: i64,
}

/// Aggregate counters for the image cache.
#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct CachedImageStats {
    pub total_rows: i64,
    pub unique_objects: i64,
    pub total_hits: i64,
    pub total_bytes: i64,
}
