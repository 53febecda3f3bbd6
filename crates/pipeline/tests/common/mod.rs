//! In-memory fakes for every capability the pipeline consumes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use beatcut_core::compose::RenderStatus;
use beatcut_core::ffmpeg::{FfmpegError, MediaInfo};
use beatcut_core::script::{BpmRange, Vibe};
use beatcut_core::cache_keys::SearchParams;
use beatcut_core::types::{DbId, Timestamp};
use beatcut_db::models::cached_image::{CachedImage, CachedImageStats, UpsertCachedImage};
use beatcut_db::models::search_cache::{SearchCacheEntry, SearchCacheStats, UpsertSearchCache};
use beatcut_llm::{GenerateRequest, GenerateResponse, LanguageModel, LlmError};
use beatcut_pipeline::audio_analyzer::MediaProbe;
use beatcut_pipeline::cache_store::{CacheStats, ImageCacheStore};
use beatcut_pipeline::music::{AudioAsset, AudioLibrary, MusicError};
use beatcut_pipeline::sourcing::{FetchedImage, ImageFetcher, ImageSearchProvider, ImageSearchResult, SourcingError};
use beatcut_render::api::RenderApiError;
use beatcut_render::engine::RenderEngine;
use beatcut_render::messages::{JobStatus, RenderSpec};
use beatcut_storage::{ObjectStore, StorageError};

/// A small PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::RgbImage::new(width, height)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Cache store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CacheTables {
    images: Vec<CachedImage>,
    searches: Vec<SearchCacheEntry>,
    next_id: DbId,
}

/// Both cache tables in memory. `set_failing(true)` makes every call error.
#[derive(Default)]
pub struct InMemoryCacheStore {
    tables: Mutex<CacheTables>,
    failing: AtomicBool,
}

impl InMemoryCacheStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn images(&self) -> Vec<CachedImage> {
        self.tables.lock().unwrap().images.clone()
    }

    pub fn searches(&self) -> Vec<SearchCacheEntry> {
        self.tables.lock().unwrap().searches.clone()
    }

    /// Move every search entry's expiry into the past.
    pub fn expire_searches(&self) {
        for entry in &mut self.tables.lock().unwrap().searches {
            entry.expires_at = Utc::now() - chrono::Duration::hours(1);
        }
    }

    /// Make every image row look unused since `at`.
    pub fn age_images(&self, at: Timestamp) {
        for row in &mut self.tables.lock().unwrap().images {
            row.last_used_at = at;
        }
    }

    fn check(&self) -> Result<(), sqlx::Error> {
        if self.failing.load(Ordering::SeqCst) {
            Err(sqlx::Error::PoolTimedOut)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ImageCacheStore for InMemoryCacheStore {
    async fn find_live_search(&self, cache_key: &str) -> Result<Option<SearchCacheEntry>, sqlx::Error> {
        self.check()?;
        let now = Utc::now();
        Ok(self
            .tables
            .lock()
            .unwrap()
            .searches
            .iter()
            .find(|e| e.cache_key == cache_key && e.expires_at > now)
            .cloned())
    }

    async fn upsert_search(&self, input: &UpsertSearchCache) -> Result<(), sqlx::Error> {
        self.check()?;
        let now = Utc::now();
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        let id = tables.next_id;
        let entry = SearchCacheEntry {
            id,
            cache_key: input.cache_key.clone(),
            query: input.query.clone(),
            results: input.results.clone(),
            result_count: input.result_count,
            hit_count: 0,
            expires_at: now + chrono::Duration::hours(input.ttl_hours),
            created_at: now,
            updated_at: now,
        };
        tables.searches.retain(|e| e.cache_key != input.cache_key);
        tables.searches.push(entry);
        Ok(())
    }

    async fn record_search_hit(&self, cache_key: &str) -> Result<(), sqlx::Error> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(entry) = tables.searches.iter_mut().find(|e| e.cache_key == cache_key) {
            entry.hit_count += 1;
        }
        Ok(())
    }

    async fn find_image_by_url_hash(&self, source_url_hash: &str) -> Result<Option<CachedImage>, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .images
            .iter()
            .find(|r| r.source_url_hash == source_url_hash)
            .cloned())
    }

    async fn find_image_by_content_hash(&self, content_hash: &str) -> Result<Option<CachedImage>, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .images
            .iter()
            .find(|r| r.content_hash == content_hash)
            .cloned())
    }

    async fn upsert_image(&self, input: &UpsertCachedImage) -> Result<CachedImage, sqlx::Error> {
        self.check()?;
        let now = Utc::now();
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables
            .images
            .iter_mut()
            .find(|r| r.source_url_hash == input.source_url_hash)
        {
            row.content_hash = input.content_hash.clone();
            row.storage_url = input.storage_url.clone();
            row.storage_key = input.storage_key.clone();
            row.last_used_at = now;
            row.updated_at = now;
            return Ok(row.clone());
        }
        tables.next_id += 1;
        let row = CachedImage {
            id: tables.next_id,
            source_url: input.source_url.clone(),
            source_url_hash: input.source_url_hash.clone(),
            content_hash: input.content_hash.clone(),
            storage_url: input.storage_url.clone(),
            storage_key: input.storage_key.clone(),
            mime_type: input.mime_type.clone(),
            width: input.width,
            height: input.height,
            file_size: input.file_size,
            hit_count: 0,
            last_used_at: now,
            created_at: now,
            updated_at: now,
        };
        tables.images.push(row.clone());
        Ok(row)
    }

    async fn record_image_hit(&self, id: DbId) -> Result<(), sqlx::Error> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables.images.iter_mut().find(|r| r.id == id) {
            row.hit_count += 1;
            row.last_used_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_expired_searches(&self) -> Result<u64, sqlx::Error> {
        self.check()?;
        let now = Utc::now();
        let mut tables = self.tables.lock().unwrap();
        let before = tables.searches.len();
        tables.searches.retain(|e| e.expires_at > now);
        Ok((before - tables.searches.len()) as u64)
    }

    async fn delete_stale_images(&self, cutoff: Timestamp, min_hit_count: i32) -> Result<u64, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.images.len();
        tables
            .images
            .retain(|r| r.last_used_at >= cutoff || r.hit_count >= min_hit_count);
        Ok((before - tables.images.len()) as u64)
    }

    async fn stats(&self) -> Result<CacheStats, sqlx::Error> {
        self.check()?;
        let now = Utc::now();
        let tables = self.tables.lock().unwrap();
        let mut objects: Vec<&str> = tables.images.iter().map(|r| r.content_hash.as_str()).collect();
        objects.sort_unstable();
        objects.dedup();
        let live = tables.searches.iter().filter(|e| e.expires_at > now).count() as i64;
        Ok(CacheStats {
            images: CachedImageStats {
                total_rows: tables.images.len() as i64,
                unique_objects: objects.len() as i64,
                total_hits: tables.images.iter().map(|r| r.hit_count as i64).sum(),
                total_bytes: tables.images.iter().map(|r| r.file_size).sum(),
            },
            searches: SearchCacheStats {
                total_rows: tables.searches.len() as i64,
                live_rows: live,
                expired_rows: tables.searches.len() as i64 - live,
                total_hits: tables.searches.iter().map(|e| e.hit_count as i64).sum(),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Object storage, fetching and search
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicU32,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn puts(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bytes: Vec<u8>, key: &str, _content_type: &str) -> Result<String, StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn url_for(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }
}

/// Serves registered bytes as `image/png`; anything else is a 404.
#[derive(Default)]
pub struct FakeFetcher {
    images: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicU32,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, bytes: Vec<u8>) {
        self.images.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, SourcingError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .images
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| SourcingError::Api {
                status: 404,
                body: url.to_string(),
            })?;
        Ok(FetchedImage {
            bytes,
            mime_type: "image/png".into(),
            width: None,
            height: None,
        })
    }
}

/// Returns three portrait hits per query, derived from the query text.
#[derive(Default)]
pub struct CountingSearch {
    calls: AtomicU32,
    queries: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl CountingSearch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn url_for(query: &str, i: usize) -> String {
        format!("https://img.test/{}/{i}.png", query.replace(' ', "-"))
    }
}

#[async_trait]
impl ImageSearchProvider for CountingSearch {
    async fn search(&self, query: &str, _params: &SearchParams) -> Result<Vec<ImageSearchResult>, SourcingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourcingError::Api {
                status: 429,
                body: "quota".into(),
            });
        }
        Ok((0..3)
            .map(|i| ImageSearchResult {
                url: Self::url_for(query, i),
                thumbnail_url: None,
                title: Some(format!("{query} {i}")),
                width: Some(1080),
                height: Some(1920),
                mime_type: Some("image/png".into()),
                context_url: None,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Language model
// ---------------------------------------------------------------------------

/// Replays scripted replies in order and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, u16>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, u16>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(content)) => Ok(GenerateResponse {
                content,
                ..Default::default()
            }),
            Some(Err(status)) => Err(LlmError::Api {
                status,
                body: "scripted failure".into(),
            }),
            None => Err(LlmError::EmptyResponse { finish_reason: None }),
        }
    }
}

/// A well-formed script reply with `lines` lines and the given keywords.
pub fn script_reply(lines: usize, vibe: &str, keywords: &[&str]) -> String {
    let purposes = ["hook", "setup", "build", "build", "climax", "climax", "cta", "cta"];
    let lines: Vec<serde_json::Value> = (0..lines)
        .map(|i| {
            serde_json::json!({
                "text": format!("line number {i}"),
                "timing": i as f64 * 2.0,
                "duration": 2.0,
                "purpose": purposes[i.min(purposes.len() - 1)],
            })
        })
        .collect();
    serde_json::json!({
        "script": { "lines": lines, "totalDuration": 15.0 },
        "vibe": vibe,
        "vibeReason": "fits the request",
        "suggestedBpmRange": { "min": 120, "max": 140 },
        "searchKeywords": keywords,
        "effectRecommendation": "fast cuts"
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// A track of `duration` seconds that is quiet except for a loud stretch
/// `[loud_from, loud_to)`.
pub struct SpikeProbe {
    pub duration: f64,
    pub loud_from: f64,
    pub loud_to: f64,
}

#[async_trait]
impl MediaProbe for SpikeProbe {
    async fn probe(&self, _path: &Path) -> Result<MediaInfo, FfmpegError> {
        Ok(MediaInfo {
            duration_secs: self.duration,
            sample_rate: 44_100,
            channels: 2,
        })
    }

    async fn measure_loudness(&self, _path: &Path, start_secs: f64, _duration_secs: f64) -> Result<f64, FfmpegError> {
        if (self.loud_from..self.loud_to).contains(&start_secs) {
            Ok(-6.0)
        } else {
            Ok(-40.0)
        }
    }
}

/// Probe whose binary is "missing".
pub struct BrokenProbe;

#[async_trait]
impl MediaProbe for BrokenProbe {
    async fn probe(&self, _path: &Path) -> Result<MediaInfo, FfmpegError> {
        Err(FfmpegError::ParseError("no streams".into()))
    }

    async fn measure_loudness(&self, _path: &Path, _start: f64, _duration: f64) -> Result<f64, FfmpegError> {
        Err(FfmpegError::ParseError("no streams".into()))
    }
}

pub struct FakeLibrary {
    pub assets: Vec<AudioAsset>,
}

#[async_trait]
impl AudioLibrary for FakeLibrary {
    async fn candidates(&self, _vibe: Vibe, _bpm_range: BpmRange) -> Result<Vec<AudioAsset>, MusicError> {
        Ok(self.assets.clone())
    }

    async fn fetch_bytes(&self, _asset: &AudioAsset) -> Result<Vec<u8>, MusicError> {
        Ok(b"RIFF fake audio".to_vec())
    }
}

pub fn track(id: &str, vibe: Vibe, bpm: Option<u32>, duration: f64) -> AudioAsset {
    AudioAsset {
        id: id.into(),
        title: id.into(),
        url: format!("https://music.test/{id}.mp3"),
        vibe,
        bpm,
        duration: Some(duration),
    }
}

// ---------------------------------------------------------------------------
// Render engine
// ---------------------------------------------------------------------------

/// Accepts every submission and replays `statuses`, then reports
/// `Processing` forever.
pub struct FakeRenderEngine {
    statuses: Mutex<VecDeque<JobStatus>>,
    submitted: Mutex<Vec<RenderSpec>>,
    cancelled: Mutex<Vec<String>>,
    fail_cancel: AtomicBool,
}

impl FakeRenderEngine {
    pub fn new(statuses: Vec<JobStatus>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into()),
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_cancel: AtomicBool::new(false),
        })
    }

    pub fn submitted(&self) -> Vec<RenderSpec> {
        self.submitted.lock().unwrap().clone()
    }

    /// Job ids the orchestrator asked to cancel.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn set_cancel_failing(&self, failing: bool) {
        self.fail_cancel.store(failing, Ordering::SeqCst);
    }
}

pub fn job_status(status: RenderStatus, progress: u8) -> JobStatus {
    JobStatus {
        status,
        progress,
        current_step: None,
        output_url: None,
        error: None,
    }
}

#[async_trait]
impl RenderEngine for FakeRenderEngine {
    async fn submit(&self, spec: &RenderSpec) -> Result<String, RenderApiError> {
        self.submitted.lock().unwrap().push(spec.clone());
        Ok("render-1".into())
    }

    async fn status(&self, _job_id: &str) -> Result<JobStatus, RenderApiError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| job_status(RenderStatus::Processing, 50)))
    }

    async fn cancel(&self, job_id: &str) -> Result<(), RenderApiError> {
        self.cancelled.lock().unwrap().push(job_id.to_string());
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(RenderApiError::ApiError {
                status: 503,
                body: "busy".into(),
            });
        }
        Ok(())
    }
}
