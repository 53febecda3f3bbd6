//! Audio analysis: where should the clip start?
//!
//! Strategies are tried in order. [`DeepAudioAnalysis`] measures the track
//! with a [`MediaProbe`] (energy curve, tempo, segments, best window);
//! [`HeuristicAudioAnalysis`] guesses from duration and known BPM. A failing
//! strategy is logged and the next one runs, so [`AudioAnalyzer::analyze`]
//! always produces a result.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

use beatcut_core::audio::{
    analyzed_start, estimate_bpm, find_best_window, heuristic_start, normalize_db, segment_curve,
    suggested_end, AudioAnalysis, AudioAnalysisResult, BpmEstimatorConfig, DEFAULT_TARGET_SECS,
    ENERGY_WINDOW_SECS,
};
use beatcut_core::ffmpeg::{self, FfmpegError, MediaInfo};

/// Upper bound on one-second energy windows measured per track.
const MAX_ENERGY_WINDOWS: usize = 600;

/// Loudness probes run concurrently per track.
const LOUDNESS_CONCURRENCY: usize = 8;

// ---------------------------------------------------------------------------
// Media probe capability
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, FfmpegError>;

    /// Mean loudness in dB of `duration_secs` starting at `start_secs`.
    async fn measure_loudness(
        &self,
        path: &Path,
        start_secs: f64,
        duration_secs: f64,
    ) -> Result<f64, FfmpegError>;
}

/// [`MediaProbe`] backed by the `ffprobe` and `ffmpeg` binaries.
pub struct FfmpegProbe;

#[async_trait]
impl MediaProbe for FfmpegProbe {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, FfmpegError> {
        ffmpeg::probe_audio(path).await
    }

    async fn measure_loudness(
        &self,
        path: &Path,
        start_secs: f64,
        duration_secs: f64,
    ) -> Result<f64, FfmpegError> {
        ffmpeg::measure_mean_volume(path, start_secs, duration_secs).await
    }
}

// ---------------------------------------------------------------------------
// Strategy interface
// ---------------------------------------------------------------------------

/// A track to analyze, with whatever the caller already knows about it.
#[derive(Debug, Clone, Default)]
pub struct AudioInput {
    pub asset_id: String,
    /// Raw file contents. Without them only the heuristic can run.
    pub bytes: Option<Arc<Vec<u8>>>,
    pub known_duration: Option<f64>,
    pub known_bpm: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis not possible: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait AudioAnalysisStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(
        &self,
        input: &AudioInput,
        target_secs: f64,
    ) -> Result<AudioAnalysisResult, AnalysisError>;
}

// ---------------------------------------------------------------------------
// Deep analysis
// ---------------------------------------------------------------------------

pub struct DeepAudioAnalysis {
    probe: Arc<dyn MediaProbe>,
    bpm_config: BpmEstimatorConfig,
}

impl DeepAudioAnalysis {
    pub fn new(probe: Arc<dyn MediaProbe>, bpm_config: BpmEstimatorConfig) -> Self {
        Self { probe, bpm_config }
    }

    async fn loudness_series(
        &self,
        path: &Path,
        starts: Vec<f64>,
        window_secs: f64,
    ) -> Result<Vec<f64>, FfmpegError> {
        stream::iter(starts)
            .map(|start| self.probe.measure_loudness(path, start, window_secs))
            .buffered(LOUDNESS_CONCURRENCY)
            .map_ok(normalize_db)
            .try_collect()
            .await
    }

    /// Run the full measurement on a file already on disk.
    pub async fn analyze_path(
        &self,
        path: &Path,
        target_secs: f64,
    ) -> Result<AudioAnalysis, AnalysisError> {
        let info = self.probe.probe(path).await?;
        let duration = info.duration_secs;

        let windows = (duration / ENERGY_WINDOW_SECS).ceil() as usize;
        let starts: Vec<f64> = (0..windows.min(MAX_ENERGY_WINDOWS))
            .map(|i| i as f64 * ENERGY_WINDOW_SECS)
            .collect();
        let energy_curve = self
            .loudness_series(path, starts, ENERGY_WINDOW_SECS)
            .await?;

        let config = &self.bpm_config;
        let bpm_window = duration.min(config.analysis_window_secs);
        let sample_count = (bpm_window * config.samples_per_sec as f64).floor() as usize;
        let sample_starts: Vec<f64> = (0..sample_count)
            .map(|i| i as f64 / config.samples_per_sec as f64)
            .collect();
        let samples = self
            .loudness_series(path, sample_starts, config.sample_secs)
            .await?;
        let bpm = estimate_bpm(&samples, bpm_window, config);

        let segments = segment_curve(&energy_curve, duration);
        let (best_start, best_energy) = find_best_window(&energy_curve, target_secs, duration);

        Ok(AudioAnalysis {
            duration,
            bpm,
            energy_curve,
            segments,
            best_start,
            best_energy,
        })
    }
}

#[async_trait]
impl AudioAnalysisStrategy for DeepAudioAnalysis {
    fn name(&self) -> &'static str {
        "deep"
    }

    async fn analyze(
        &self,
        input: &AudioInput,
        target_secs: f64,
    ) -> Result<AudioAnalysisResult, AnalysisError> {
        let bytes = input
            .bytes
            .as_ref()
            .ok_or_else(|| AnalysisError::Unavailable("no audio bytes".into()))?;

        // One spill to disk per analysis; every probe reads the same file.
        let file = tempfile::Builder::new()
            .prefix("beatcut-audio-")
            .tempfile()?;
        tokio::fs::write(file.path(), bytes.as_slice()).await?;

        let analysis = self.analyze_path(file.path(), target_secs).await?;
        let start = analyzed_start(&analysis, target_secs);

        tracing::debug!(
            asset_id = %input.asset_id,
            duration = analysis.duration,
            bpm = analysis.bpm,
            best_start = analysis.best_start,
            suggested_start = start,
            "Deep audio analysis complete",
        );

        Ok(AudioAnalysisResult {
            asset_id: input.asset_id.clone(),
            duration: analysis.duration,
            bpm: Some(analysis.bpm),
            suggested_start_time: start,
            suggested_end_time: suggested_end(start, analysis.duration, target_secs),
            analyzed: true,
            analysis: Some(analysis),
        })
    }
}

// ---------------------------------------------------------------------------
// Heuristic
// ---------------------------------------------------------------------------

/// Length-bucket estimate of the first chorus. Never fails.
pub struct HeuristicAudioAnalysis;

impl HeuristicAudioAnalysis {
    pub fn estimate(input: &AudioInput, target_secs: f64) -> AudioAnalysisResult {
        let duration = input.known_duration.unwrap_or(0.0);
        let start = heuristic_start(duration, target_secs, input.known_bpm.map(f64::from));
        AudioAnalysisResult {
            asset_id: input.asset_id.clone(),
            duration,
            bpm: input.known_bpm,
            suggested_start_time: start,
            suggested_end_time: suggested_end(start, duration, target_secs),
            analyzed: false,
            analysis: None,
        }
    }
}

#[async_trait]
impl AudioAnalysisStrategy for HeuristicAudioAnalysis {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn analyze(
        &self,
        input: &AudioInput,
        target_secs: f64,
    ) -> Result<AudioAnalysisResult, AnalysisError> {
        Ok(Self::estimate(input, target_secs))
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

pub struct AudioAnalyzer {
    strategies: Vec<Arc<dyn AudioAnalysisStrategy>>,
}

impl AudioAnalyzer {
    pub fn new(strategies: Vec<Arc<dyn AudioAnalysisStrategy>>) -> Self {
        Self { strategies }
    }

    /// Deep analysis through `probe`, then the heuristic.
    pub fn with_probe(probe: Arc<dyn MediaProbe>, bpm_config: BpmEstimatorConfig) -> Self {
        Self::new(vec![
            Arc::new(DeepAudioAnalysis::new(probe, bpm_config)),
            Arc::new(HeuristicAudioAnalysis),
        ])
    }

    pub async fn analyze(&self, input: &AudioInput, target_secs: f64) -> AudioAnalysisResult {
        let target_secs = if target_secs > 0.0 {
            target_secs
        } else {
            DEFAULT_TARGET_SECS
        };

        for strategy in &self.strategies {
            match strategy.analyze(input, target_secs).await {
                Ok(result) => return result,
                Err(e) => {
                    tracing::warn!(
                        asset_id = %input.asset_id,
                        strategy = strategy.name(),
                        error = %e,
                        "Audio analysis strategy failed, trying next",
                    );
                }
            }
        }

        HeuristicAudioAnalysis::estimate(input, target_secs)
    }
}

impl Default for AudioAnalyzer {
    fn default() -> Self {
        Self::with_probe(Arc::new(FfmpegProbe), BpmEstimatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(duration: f64, bpm: Option<u32>) -> AudioInput {
        AudioInput {
            asset_id: "track-1".into(),
            bytes: None,
            known_duration: Some(duration),
            known_bpm: bpm,
        }
    }

    #[test]
    fn heuristic_long_track_at_128_bpm() {
        let result = HeuristicAudioAnalysis::estimate(&input(200.0, Some(128)), 15.0);
        assert!((result.suggested_start_time - 46.25).abs() < 1e-9);
        assert!((result.suggested_end_time - 61.25).abs() < 1e-9);
        assert!(!result.analyzed);
        assert_eq!(result.bpm, Some(128));
    }

    #[test]
    fn heuristic_short_track_starts_at_zero() {
        let result = HeuristicAudioAnalysis::estimate(&input(20.0, None), 15.0);
        assert_eq!(result.suggested_start_time, 0.0);
        assert_eq!(result.suggested_end_time, 15.0);
    }

    #[test]
    fn heuristic_without_bpm_uses_default_buildup() {
        // 100 s track: drop at 25 s, minus the 6 s default lead-in.
        let result = HeuristicAudioAnalysis::estimate(&input(100.0, None), 15.0);
        assert!((result.suggested_start_time - 19.0).abs() < 1e-9);
        assert_eq!(result.bpm, None);
    }

    #[tokio::test]
    async fn deep_without_bytes_falls_back_to_heuristic() {
        let analyzer = AudioAnalyzer::default();
        let result = analyzer.analyze(&input(200.0, Some(128)), 15.0).await;
        assert!(!result.analyzed);
        assert!((result.suggested_start_time - 46.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_strategy_list_still_answers() {
        let analyzer = AudioAnalyzer::new(vec![]);
        let result = analyzer.analyze(&input(20.0, None), 0.0).await;
        assert_eq!(result.suggested_start_time, 0.0);
        assert_eq!(result.suggested_end_time, DEFAULT_TARGET_SECS);
    }
}
