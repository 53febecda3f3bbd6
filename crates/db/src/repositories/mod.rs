//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod cached_image_repo;
pub mod search_cache_repo;

pub use cached_image_repo::CachedImageRepo;
pub use search_cache_repo::SearchCacheRepo;
