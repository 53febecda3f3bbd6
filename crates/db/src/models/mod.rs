//! Row models and DTOs for the cache tables.

pub mod cached_image;
pub mod search_cache;
