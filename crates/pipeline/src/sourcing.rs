//! Image search, download, and candidate selection.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use beatcut_core::cache_keys::{image_url_hash, SearchParams};
use beatcut_core::compose::{image_quality_score, ImageCandidate};

use crate::error::PipelineError;
use crate::image_cache::{CachedImageResult, ImageCache};

/// Largest image body the fetcher accepts.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Keywords combined into one search query.
const KEYWORDS_PER_QUERY: usize = 3;

/// Searches issued per sourcing run.
const MAX_QUERIES: usize = 3;

pub const DEFAULT_SELECT_COUNT: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum SourcingError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Search API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Unsupported content type '{0}'")]
    UnsupportedType(String),
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// One hit from an image search. Stored as-is in the search cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSearchResult {
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mime_type: Option<String>,
    pub context_url: Option<String>,
}

#[async_trait]
pub trait ImageSearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<ImageSearchResult>, SourcingError>;
}

pub const GOOGLE_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Programmable Search (image mode). Returns at most 10 hits per call.
pub struct GoogleImageSearch {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    cx: String,
}

#[derive(Debug, Deserialize)]
struct GoogleSearchResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    link: String,
    title: Option<String>,
    mime: Option<String>,
    image: Option<GoogleImageMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleImageMeta {
    thumbnail_link: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    context_link: Option<String>,
}

impl GoogleImageSearch {
    pub fn new(api_key: String, cx: String) -> Self {
        Self::with_client(reqwest::Client::new(), GOOGLE_SEARCH_URL.to_string(), api_key, cx)
    }

    pub fn with_client(client: reqwest::Client, base_url: String, api_key: String, cx: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            cx,
        }
    }
}

#[async_trait]
impl ImageSearchProvider for GoogleImageSearch {
    async fn search(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<ImageSearchResult>, SourcingError> {
        let num = params.max_results.clamp(1, 10).to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cx.as_str()),
                ("q", query),
                ("searchType", "image"),
                ("num", num.as_str()),
                ("safe", params.safe_search.as_str()),
                ("imgSize", params.image_size.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SourcingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GoogleSearchResponse = response.json().await?;
        Ok(parsed
            .items
            .into_iter()
            .map(|item| {
                let meta = item.image;
                ImageSearchResult {
                    url: item.link,
                    title: item.title,
                    mime_type: item.mime,
                    thumbnail_url: meta.as_ref().and_then(|m| m.thumbnail_link.clone()),
                    width: meta.as_ref().and_then(|m| m.width),
                    height: meta.as_ref().and_then(|m| m.height),
                    context_url: meta.and_then(|m| m.context_link),
                }
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, SourcingError>;
}

/// Read width and height from the image header without decoding pixels.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_bytes: MAX_IMAGE_BYTES,
        }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, SourcingError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourcingError::Api {
                status: status.as_u16(),
                body: format!("fetching {url}"),
            });
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !mime_type.starts_with("image/") {
            return Err(SourcingError::UnsupportedType(mime_type));
        }
        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(SourcingError::TooLarge {
                    size: len as usize,
                    limit: self.max_bytes,
                });
            }
        }

        let bytes = response.bytes().await?;
        if bytes.len() > self.max_bytes {
            return Err(SourcingError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let dims = image_dimensions(&bytes);
        Ok(FetchedImage {
            bytes: bytes.to_vec(),
            mime_type,
            width: dims.map(|d| d.0),
            height: dims.map(|d| d.1),
        })
    }
}

// ---------------------------------------------------------------------------
// Sourcing
// ---------------------------------------------------------------------------

/// Split keywords into the keyword sets searched, preserving priority order.
pub fn query_groups(keywords: &[String]) -> Vec<Vec<String>> {
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>()
        .chunks(KEYWORDS_PER_QUERY)
        .take(MAX_QUERIES)
        .map(<[String]>::to_vec)
        .collect()
}

/// Turn raw search hits into scored candidates: dedup by normalized URL,
/// sort by quality, and select the best `select_count`.
pub fn rank_candidates(results: Vec<ImageSearchResult>, select_count: usize) -> Vec<ImageCandidate> {
    let mut seen = std::collections::HashSet::new();
    let mut candidates: Vec<ImageCandidate> = results
        .into_iter()
        .filter_map(|r| {
            let hash = image_url_hash(&r.url);
            if !seen.insert(hash.clone()) {
                return None;
            }
            Some(ImageCandidate {
                id: hash[..16].to_string(),
                quality_score: image_quality_score(r.width, r.height),
                source_url: r.url,
                thumbnail_url: r.thumbnail_url,
                width: r.width,
                height: r.height,
                is_selected: false,
                sort_order: 0,
            })
        })
        .collect();

    // Stable sort keeps search order among equal scores.
    candidates.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
    for (i, c) in candidates.iter_mut().enumerate() {
        c.sort_order = i as u32;
        c.is_selected = i < select_count;
    }
    candidates
}

pub struct ImageSourcer {
    cache: Arc<ImageCache>,
    provider: Arc<dyn ImageSearchProvider>,
    params: SearchParams,
    select_count: usize,
}

impl ImageSourcer {
    pub fn new(cache: Arc<ImageCache>, provider: Arc<dyn ImageSearchProvider>) -> Self {
        Self {
            cache,
            provider,
            params: SearchParams::default(),
            select_count: DEFAULT_SELECT_COUNT,
        }
    }

    pub fn with_params(mut self, params: SearchParams, select_count: usize) -> Self {
        self.params = params;
        self.select_count = select_count.max(1);
        self
    }

    /// Search for every keyword group (through the search cache) and rank
    /// the combined hits. A failing search is logged and skipped.
    pub async fn find_candidates(
        &self,
        keywords: &[String],
    ) -> Result<Vec<ImageCandidate>, PipelineError> {
        let groups = query_groups(keywords);
        let mut results = Vec::new();

        for group in &groups {
            match self
                .cache
                .search_with_cache(group, &self.params, self.provider.as_ref())
                .await
            {
                Ok(search) => results.extend(search.results),
                Err(e) => {
                    tracing::warn!(keywords = ?group, error = %e, "Image search failed");
                }
            }
        }

        let candidates = rank_candidates(results, self.select_count);
        if candidates.is_empty() {
            return Err(PipelineError::NoImages(keywords.join(", ")));
        }
        tracing::info!(
            queries = groups.len(),
            candidates = candidates.len(),
            selected = candidates.iter().filter(|c| c.is_selected).count(),
            "Image candidates ranked",
        );
        Ok(candidates)
    }

    /// Copy the selected candidates into object storage (deduplicated by
    /// content) and return URLs the render engine can use, in sort order.
    pub async fn materialize(&self, candidates: &[ImageCandidate]) -> Vec<CachedImageResult> {
        let mut selected: Vec<&ImageCandidate> =
            candidates.iter().filter(|c| c.is_selected).collect();
        selected.sort_by_key(|c| c.sort_order);
        let urls: Vec<String> = selected.iter().map(|c| c.source_url.clone()).collect();
        self.cache.cache_images(&urls).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str, w: Option<u32>, h: Option<u32>) -> ImageSearchResult {
        ImageSearchResult {
            url: url.into(),
            thumbnail_url: None,
            title: None,
            width: w,
            height: h,
            mime_type: None,
            context_url: None,
        }
    }

    #[test]
    fn groups_keep_priority_and_limit() {
        let keywords: Vec<String> = ["a", " ", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let groups = query_groups(&keywords);
        assert_eq!(groups.len(), MAX_QUERIES);
        assert_eq!(groups[0], vec!["a", "b", "c"]);
        assert_eq!(groups[2], vec!["g", "h", "i"]);
    }

    #[test]
    fn ranking_dedups_tracking_variants() {
        let results = vec![
            hit("https://img.example/a.jpg?utm_source=x", Some(1080), Some(1920)),
            hit("https://img.example/a.jpg", Some(1080), Some(1920)),
            hit("https://img.example/b.jpg", Some(640), Some(480)),
        ];
        let ranked = rank_candidates(results, 1);
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].source_url.contains("a.jpg"));
        assert!(ranked[0].is_selected);
        assert!(!ranked[1].is_selected);
        assert_eq!(ranked[1].sort_order, 1);
    }

    #[test]
    fn ranking_prefers_portrait_over_unknown() {
        let results = vec![
            hit("https://img.example/unknown.jpg", None, None),
            hit("https://img.example/portrait.jpg", Some(1080), Some(1920)),
        ];
        let ranked = rank_candidates(results, 5);
        assert!(ranked[0].source_url.ends_with("portrait.jpg"));
        assert!(ranked.iter().all(|c| c.is_selected));
    }

    #[test]
    fn dimensions_from_png_header() {
        let mut png = Cursor::new(Vec::new());
        image::RgbImage::new(4, 7)
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();
        assert_eq!(image_dimensions(png.get_ref()), Some((4, 7)));
        assert_eq!(image_dimensions(b"not an image"), None);
    }
}
