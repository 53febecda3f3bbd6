//! Music matching: pick a library track for a vibe and tempo range, then
//! find where the clip should start in it.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use beatcut_core::audio::AudioAnalysisResult;
use beatcut_core::script::{BpmRange, Vibe};

use crate::audio_analyzer::{AudioAnalyzer, AudioInput};
use crate::error::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum MusicError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid audio catalog: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("Audio download failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Audio download failed ({status}): {url}")]
    FetchStatus { status: u16, url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAsset {
    pub id: String,
    pub title: String,
    /// `http(s)://` or `file://` URL, or a plain filesystem path.
    pub url: String,
    pub vibe: Vibe,
    #[serde(default)]
    pub bpm: Option<u32>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[async_trait]
pub trait AudioLibrary: Send + Sync {
    /// Assets worth considering for `vibe` and `bpm_range`, in any order.
    async fn candidates(&self, vibe: Vibe, bpm_range: BpmRange) -> Result<Vec<AudioAsset>, MusicError>;

    async fn fetch_bytes(&self, asset: &AudioAsset) -> Result<Vec<u8>, MusicError>;
}

// ---------------------------------------------------------------------------
// Static catalog
// ---------------------------------------------------------------------------

/// Library backed by a JSON array of [`AudioAsset`]s loaded at startup.
pub struct StaticAudioLibrary {
    assets: Vec<AudioAsset>,
    client: reqwest::Client,
}

enum AssetLocation {
    Remote(String),
    Local(PathBuf),
}

fn locate(raw: &str) -> AssetLocation {
    match url::Url::parse(raw) {
        Ok(parsed) if parsed.scheme() == "file" => match parsed.to_file_path() {
            Ok(path) => AssetLocation::Local(path),
            Err(()) => AssetLocation::Local(PathBuf::from(parsed.path())),
        },
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            AssetLocation::Remote(parsed.into())
        }
        _ => AssetLocation::Local(PathBuf::from(raw)),
    }
}

impl StaticAudioLibrary {
    pub fn new(assets: Vec<AudioAsset>) -> Self {
        Self {
            assets,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, MusicError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub async fn from_path(path: &Path) -> Result<Self, MusicError> {
        let json = tokio::fs::read_to_string(path).await?;
        let library = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), assets = library.assets.len(), "Audio catalog loaded");
        Ok(library)
    }

    pub fn assets(&self) -> &[AudioAsset] {
        &self.assets
    }
}

#[async_trait]
impl AudioLibrary for StaticAudioLibrary {
    async fn candidates(&self, vibe: Vibe, bpm_range: BpmRange) -> Result<Vec<AudioAsset>, MusicError> {
        Ok(self
            .assets
            .iter()
            .filter(|a| a.vibe == vibe || a.bpm.is_some_and(|bpm| bpm_range.contains(bpm)))
            .cloned()
            .collect())
    }

    async fn fetch_bytes(&self, asset: &AudioAsset) -> Result<Vec<u8>, MusicError> {
        match locate(&asset.url) {
            AssetLocation::Local(path) => Ok(tokio::fs::read(path).await?),
            AssetLocation::Remote(url) => {
                let response = self.client.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(MusicError::FetchStatus {
                        status: status.as_u16(),
                        url,
                    });
                }
                Ok(response.bytes().await?.to_vec())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Best first: vibe match, then BPM inside the range, then closeness to
/// the range center. Unknown BPM sorts after every known one.
pub fn rank_assets(mut assets: Vec<AudioAsset>, vibe: Vibe, bpm_range: BpmRange) -> Vec<AudioAsset> {
    let center = bpm_range.center();
    let distance = |a: &AudioAsset| a.bpm.map_or(f64::INFINITY, |bpm| (bpm as f64 - center).abs());
    assets.sort_by(|a, b| {
        (b.vibe == vibe)
            .cmp(&(a.vibe == vibe))
            .then_with(|| {
                let in_a = a.bpm.is_some_and(|bpm| bpm_range.contains(bpm));
                let in_b = b.bpm.is_some_and(|bpm| bpm_range.contains(bpm));
                in_b.cmp(&in_a)
            })
            .then_with(|| distance(a).partial_cmp(&distance(b)).unwrap_or(Ordering::Equal))
    });
    assets
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedAudio {
    pub asset: AudioAsset,
    pub analysis: AudioAnalysisResult,
}

pub struct MusicMatcher {
    library: Arc<dyn AudioLibrary>,
    analyzer: Arc<AudioAnalyzer>,
}

impl MusicMatcher {
    pub fn new(library: Arc<dyn AudioLibrary>, analyzer: Arc<AudioAnalyzer>) -> Self {
        Self { library, analyzer }
    }

    /// Choose the best track and analyze it for a `target_secs` clip.
    ///
    /// A download failure only costs the deep analysis; the heuristic still
    /// answers from the catalog's duration and BPM.
    pub async fn match_track(
        &self,
        vibe: Vibe,
        bpm_range: BpmRange,
        target_secs: f64,
    ) -> Result<MatchedAudio, PipelineError> {
        let candidates = self.library.candidates(vibe, bpm_range).await?;
        let count = candidates.len();
        let asset = rank_assets(candidates, vibe, bpm_range)
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::NoAudioMatch {
                vibe: vibe.as_str().to_string(),
                min: bpm_range.min,
                max: bpm_range.max,
            })?;
        tracing::info!(
            asset_id = %asset.id,
            candidates = count,
            vibe = vibe.as_str(),
            bpm = asset.bpm,
            "Audio track selected",
        );

        let bytes = match self.library.fetch_bytes(&asset).await {
            Ok(bytes) => Some(Arc::new(bytes)),
            Err(e) => {
                tracing::warn!(asset_id = %asset.id, error = %e, "Audio download failed, using heuristic start");
                None
            }
        };
        let input = AudioInput {
            asset_id: asset.id.clone(),
            bytes,
            known_duration: asset.duration,
            known_bpm: asset.bpm,
        };
        let analysis = self.analyzer.analyze(&input, target_secs).await;

        Ok(MatchedAudio { asset, analysis })
    }
}
