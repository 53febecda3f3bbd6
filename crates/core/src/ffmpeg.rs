//! FFmpeg/FFprobe command utilities for audio analysis.
//!
//! `ffprobe` supplies duration and stream metadata; `ffmpeg -af
//! volumedetect` measures the mean loudness of a time slice.

use std::path::Path;

use serde::Deserialize;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("media file not found: {0}")]
    MediaNotFound(String),
}

/// Basic facts about an audio file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u32,
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub channels: Option<u32>,
    pub sample_rate: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `ffprobe` on an audio file and summarize the first audio stream.
pub async fn probe_audio(path: &Path) -> Result<MediaInfo, FfmpegError> {
    ensure_exists(path)?;

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let probe = serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))?;
    media_info(&probe)
}

/// Mean loudness in dB of `duration_secs` starting at `start_secs`.
pub async fn measure_mean_volume(
    path: &Path,
    start_secs: f64,
    duration_secs: f64,
) -> Result<f64, FfmpegError> {
    ensure_exists(path)?;

    let output = tokio::process::Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-nostats",
            "-ss",
            &format!("{start_secs:.3}"),
            "-t",
            &format!("{duration_secs:.3}"),
            "-i",
        ])
        .arg(path)
        .args(["-af", "volumedetect", "-f", "null", "-"])
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    // volumedetect reports on stderr.
    let stderr = String::from_utf8_lossy(&output.stderr);
    parse_volumedetect(&stderr, "mean_volume")
        .ok_or_else(|| FfmpegError::ParseError(format!("no mean_volume in output: {stderr}")))
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn ensure_exists(path: &Path) -> Result<(), FfmpegError> {
    if path.exists() {
        Ok(())
    } else {
        Err(FfmpegError::MediaNotFound(path.to_string_lossy().to_string()))
    }
}

fn first_audio_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
}

/// Duration in seconds: format-level first, then the audio stream.
pub fn parse_duration(probe: &FfprobeOutput) -> Option<f64> {
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            first_audio_stream(probe)
                .and_then(|s| s.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
}

/// Build [`MediaInfo`], failing when there is no audio stream or duration.
pub fn media_info(probe: &FfprobeOutput) -> Result<MediaInfo, FfmpegError> {
    let stream = first_audio_stream(probe)
        .ok_or_else(|| FfmpegError::ParseError("no audio stream".into()))?;
    let duration_secs = parse_duration(probe)
        .filter(|d| *d > 0.0)
        .ok_or_else(|| FfmpegError::ParseError("missing or zero duration".into()))?;

    Ok(MediaInfo {
        duration_secs,
        sample_rate: stream
            .sample_rate
            .as_deref()
            .and_then(|r| r.parse::<u32>().ok())
            .unwrap_or(0),
        channels: stream.channels.unwrap_or(0),
    })
}

/// Pull a value such as `mean_volume: -18.5 dB` out of volumedetect output.
///
/// `-inf dB` (pure silence) is reported as `f64::NEG_INFINITY`.
pub fn parse_volumedetect(text: &str, key: &str) -> Option<f64> {
    let needle = format!("{key}:");
    text.lines().find_map(|line| {
        let (_, rest) = line.split_once(&needle)?;
        let value = rest.trim().trim_end_matches("dB").trim();
        if value == "-inf" {
            Some(f64::NEG_INFINITY)
        } else {
            value.parse::<f64>().ok()
        }
    })
}
