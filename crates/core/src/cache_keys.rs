//! Cache key derivation for the image and search caches.
//!
//! Two kinds of keys exist:
//!
//! - **Search keys** digest a normalized keyword set plus the search
//!   parameters. Keyword order, case, surrounding whitespace and
//!   duplicates do not affect the key.
//! - **Image URL hashes** digest a source URL after known tracking
//!   parameters have been stripped, so cosmetically different links to
//!   the same resource collide.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::hashing::sha256_hex;

/// Separator placed between normalized keywords before hashing.
const KEYWORD_SEPARATOR: &str = "|";

/// Query parameters removed before hashing an image URL.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "ref", "source"];

/// Any query parameter with this prefix is a tracking parameter.
const TRACKING_PREFIX: &str = "utm_";

// ---------------------------------------------------------------------------
// Search parameters
// ---------------------------------------------------------------------------

/// Safe-search level passed to the image search provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafeSearch {
    Off,
    #[default]
    Active,
}

impl SafeSearch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Active => "active",
        }
    }
}

/// Image size class passed to the image search provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageSizeClass {
    Medium,
    #[default]
    Large,
    Xlarge,
    Huge,
}

impl ImageSizeClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Xlarge => "xlarge",
            Self::Huge => "huge",
        }
    }
}

/// Parameters that, together with the keyword set, identify a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub safe_search: SafeSearch,
    pub image_size: ImageSizeClass,
    pub max_results: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            safe_search: SafeSearch::default(),
            image_size: ImageSizeClass::default(),
            max_results: 10,
        }
    }
}

impl SearchParams {
    /// Canonical string form appended to the keyword component of a key.
    pub fn normalized(&self) -> String {
        format!(
            "safe={};size={};max={}",
            self.safe_search.as_str(),
            self.image_size.as_str(),
            self.max_results
        )
    }
}

// ---------------------------------------------------------------------------
// Search keys
// ---------------------------------------------------------------------------

/// Trim, lowercase, sort and dedup a keyword list. Empty entries are dropped.
pub fn normalize_keywords<S: AsRef<str>>(keywords: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = keywords
        .iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Text sent to a live search for `keywords`.
///
/// Covers the same keyword set as [`normalize_keywords`]: case-insensitive
/// duplicates and blanks are dropped. First spelling and order are kept.
pub fn search_query<S: AsRef<str>>(keywords: &[S]) -> String {
    let mut seen: Vec<String> = Vec::new();
    let mut terms: Vec<&str> = Vec::new();
    for keyword in keywords {
        let term = keyword.as_ref().trim();
        let folded = term.to_lowercase();
        if term.is_empty() || seen.contains(&folded) {
            continue;
        }
        seen.push(folded);
        terms.push(term);
    }
    terms.join(" ")
}

/// Derive the search cache key for a keyword set and its parameters.
pub fn search_cache_key<S: AsRef<str>>(keywords: &[S], params: &SearchParams) -> String {
    let joined = normalize_keywords(keywords).join(KEYWORD_SEPARATOR);
    sha256_hex(format!("{joined}#{}", params.normalized()).as_bytes())
}

// ---------------------------------------------------------------------------
// Image URL hashes
// ---------------------------------------------------------------------------

fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with(TRACKING_PREFIX) || TRACKING_PARAMS.contains(&lower.as_str())
}

/// Strip tracking parameters from `raw`.
///
/// Strings that do not parse as absolute URLs are returned trimmed but
/// otherwise untouched.
pub fn normalize_image_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    parsed.to_string()
}

/// Hash of the normalized form of an image URL.
pub fn image_url_hash(raw: &str) -> String {
    sha256_hex(normalize_image_url(raw).as_bytes())
}
