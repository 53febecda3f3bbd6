//! Audio energy heuristics: energy curves, BPM estimation, segment
//! classification, best-window search and beat-aligned lead-in.
//!
//! Everything here operates on already-measured loudness values. The
//! measuring itself (ffmpeg) lives in [`crate::ffmpeg`] and is driven by the
//! pipeline's audio analyzer.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Loudness floor mapped to energy 0.0.
pub const SILENCE_FLOOR_DB: f64 = -60.0;

/// Width of one energy-curve sample in seconds.
pub const ENERGY_WINDOW_SECS: f64 = 1.0;

/// Width of one classification segment in seconds.
pub const SEGMENT_WINDOW_SECS: usize = 4;

/// Default clip length searched for by [`find_best_window`].
pub const DEFAULT_TARGET_SECS: f64 = 15.0;

/// Tracks no longer than `target * SHORT_TRACK_FACTOR` are used from 0.
pub const SHORT_TRACK_FACTOR: f64 = 1.5;

/// Lead-in length when the tempo is unknown.
pub const DEFAULT_BUILDUP_SECS: f64 = 6.0;
pub const MIN_BUILDUP_SECS: f64 = 3.0;
pub const MAX_BUILDUP_SECS: f64 = 8.0;

/// Two bars of 4/4.
pub const BUILDUP_BEATS: f64 = 8.0;

const LOW_ENERGY: f64 = 0.4;
const HIGH_ENERGY: f64 = 0.7;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Structural role of a segment, derived from its energy and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    Intro,
    Verse,
    Chorus,
    Bridge,
    Outro,
    Unknown,
}

/// A fixed-width slice of the energy curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    pub start: f64,
    pub end: f64,
    pub energy: f64,
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
}

/// Full result of a deep analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAnalysis {
    pub duration: f64,
    pub bpm: u32,
    pub energy_curve: Vec<f64>,
    pub segments: Vec<AudioSegment>,
    pub best_start: f64,
    pub best_energy: f64,
}

/// What callers of the analyzer receive.
///
/// `analyzed == false` means the heuristic fallback produced the timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAnalysisResult {
    pub asset_id: String,
    pub duration: f64,
    pub bpm: Option<u32>,
    pub suggested_start_time: f64,
    pub suggested_end_time: f64,
    pub analyzed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AudioAnalysis>,
}

/// Tunables for the peak-counting tempo estimate.
///
/// The estimate only aims at a plausible tempo class, so every constant is
/// exposed rather than hard-coded.
#[derive(Debug, Clone, PartialEq)]
pub struct BpmEstimatorConfig {
    /// A sample must exceed `threshold_multiplier * local_mean` to count.
    pub threshold_multiplier: f64,
    /// Samples on each side used for the local mean.
    pub local_radius: usize,
    pub min_bpm: u32,
    pub max_bpm: u32,
    /// Only the first `analysis_window_secs` of the track are sampled.
    pub analysis_window_secs: f64,
    pub samples_per_sec: u32,
    /// Length of each loudness probe.
    pub sample_secs: f64,
}

impl Default for BpmEstimatorConfig {
    fn default() -> Self {
        Self {
            threshold_multiplier: 1.2,
            local_radius: 5,
            min_bpm: 60,
            max_bpm: 200,
            analysis_window_secs: 30.0,
            samples_per_sec: 10,
            sample_secs: 0.1,
        }
    }
}

// ---------------------------------------------------------------------------
// Energy
// ---------------------------------------------------------------------------

/// Map a mean loudness in dB to `[0, 1]` (-60 dB -> 0, 0 dB -> 1).
pub fn normalize_db(mean_db: f64) -> f64 {
    if mean_db.is_nan() {
        return 0.0;
    }
    ((mean_db - SILENCE_FLOOR_DB) / -SILENCE_FLOOR_DB).clamp(0.0, 1.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Tempo
// ---------------------------------------------------------------------------

/// Count samples that are local maxima and exceed the scaled local mean.
pub fn count_peaks(samples: &[f64], config: &BpmEstimatorConfig) -> usize {
    let mut peaks = 0;
    for i in 1..samples.len().saturating_sub(1) {
        let value = samples[i];
        if value < samples[i - 1] || value < samples[i + 1] {
            continue;
        }
        let lo = i.saturating_sub(config.local_radius);
        let hi = (i + config.local_radius + 1).min(samples.len());
        let local_mean = mean(&samples[lo..hi]);
        if local_mean > 0.0 && value > local_mean * config.threshold_multiplier {
            peaks += 1;
        }
    }
    peaks
}

/// Estimate tempo from short-window energy samples.
///
/// `window_secs` is the span the samples cover. The result is always
/// inside `[min_bpm, max_bpm]`.
pub fn estimate_bpm(samples: &[f64], window_secs: f64, config: &BpmEstimatorConfig) -> u32 {
    if window_secs <= 0.0 {
        return config.min_bpm;
    }
    let peaks = count_peaks(samples, config) as f64;
    let bpm = (peaks / window_secs * 60.0).round();
    (bpm as u32).clamp(config.min_bpm, config.max_bpm)
}

// ---------------------------------------------------------------------------
// Segmentation
// ---------------------------------------------------------------------------

/// Split a per-second curve into 4-second segments and classify each one.
pub fn segment_curve(curve: &[f64], duration: f64) -> Vec<AudioSegment> {
    curve
        .chunks(SEGMENT_WINDOW_SECS)
        .enumerate()
        .map(|(i, chunk)| {
            let start = (i * SEGMENT_WINDOW_SECS) as f64;
            let end = (start + chunk.len() as f64).min(duration.max(start));
            let energy = mean(chunk);
            AudioSegment {
                start,
                end,
                energy,
                segment_type: classify_segment(energy, start, duration),
            }
        })
        .collect()
}

/// Classify one segment from its mean energy and start position.
pub fn classify_segment(energy: f64, start: f64, duration: f64) -> SegmentType {
    if energy < LOW_ENERGY && start == 0.0 {
        SegmentType::Intro
    } else if energy < LOW_ENERGY && start >= duration - SEGMENT_WINDOW_SECS as f64 {
        SegmentType::Outro
    } else if energy > HIGH_ENERGY {
        SegmentType::Chorus
    } else if energy > LOW_ENERGY {
        SegmentType::Verse
    } else {
        SegmentType::Bridge
    }
}

// ---------------------------------------------------------------------------
// Best window
// ---------------------------------------------------------------------------

/// Find the `target_secs` window with the highest mean energy.
///
/// Returns `(start_secs, mean_energy)`. Tracks no longer than
/// `1.5 * target_secs` always start at 0.
pub fn find_best_window(curve: &[f64], target_secs: f64, duration: f64) -> (f64, f64) {
    let window = (target_secs.round() as usize).max(1);

    if duration <= target_secs * SHORT_TRACK_FACTOR || curve.len() <= window {
        let head = &curve[..curve.len().min(window)];
        return (0.0, mean(head));
    }

    let mut sum: f64 = curve[..window].iter().sum();
    let mut best_sum = sum;
    let mut best_index = 0;

    for i in 1..=(curve.len() - window) {
        sum += curve[i + window - 1] - curve[i - 1];
        if sum > best_sum {
            best_sum = sum;
            best_index = i;
        }
    }

    (best_index as f64 * ENERGY_WINDOW_SECS, best_sum / window as f64)
}

// ---------------------------------------------------------------------------
// Lead-in
// ---------------------------------------------------------------------------

/// Seconds of lead-in before the climax: two bars at `bpm`, clamped.
pub fn buildup_seconds(bpm: Option<f64>) -> f64 {
    match bpm {
        Some(bpm) if bpm > 0.0 && bpm.is_finite() => {
            (BUILDUP_BEATS / (bpm / 60.0)).clamp(MIN_BUILDUP_SECS, MAX_BUILDUP_SECS)
        }
        _ => DEFAULT_BUILDUP_SECS,
    }
}

/// Clamp a suggested start into `[0, duration - target]`.
///
/// The upper bound only applies when `duration - target` is positive.
pub fn clamp_start(start: f64, duration: f64, target_secs: f64) -> f64 {
    let latest = duration - target_secs;
    let start = start.max(0.0);
    if latest > 0.0 {
        start.min(latest)
    } else {
        start
    }
}

/// End of the suggested clip, never past the end of the track.
pub fn suggested_end(start: f64, duration: f64, target_secs: f64) -> f64 {
    let end = start + target_secs;
    if duration > 0.0 {
        end.min(duration)
    } else {
        end
    }
}

// ---------------------------------------------------------------------------
// Heuristic fallback
// ---------------------------------------------------------------------------

/// Guess where the first chorus lands from the track length alone.
pub fn estimate_drop_position(duration: f64) -> f64 {
    let (fraction, cap) = if duration > 180.0 {
        (0.25, 50.0)
    } else if duration > 120.0 {
        (0.28, 40.0)
    } else if duration > 60.0 {
        (0.30, 25.0)
    } else if duration > 30.0 {
        (0.35, 15.0)
    } else {
        return 0.0;
    };
    (duration * fraction).min(cap)
}

/// Suggested clip start when no deep analysis is available.
pub fn heuristic_start(duration: f64, target_secs: f64, bpm: Option<f64>) -> f64 {
    if duration <= 0.0 || duration <= target_secs * SHORT_TRACK_FACTOR {
        return 0.0;
    }
    let drop = estimate_drop_position(duration);
    if drop <= 0.0 {
        return 0.0;
    }
    clamp_start(drop - buildup_seconds(bpm), duration, target_secs)
}

/// Suggested clip start from a deep analysis: the best window minus the
/// lead-in.
pub fn analyzed_start(analysis: &AudioAnalysis, target_secs: f64) -> f64 {
    if analysis.best_start <= 0.0 {
        return 0.0;
    }
    let lead_in = buildup_seconds(Some(analysis.bpm as f64));
    clamp_start(analysis.best_start - lead_in, analysis.duration, target_secs)
}

// ---------------------------------------------------------------------------
// Climax alignment
// ---------------------------------------------------------------------------

impl AudioAnalysisResult {
    /// Track time of the musical climax: the best window when the track was
    /// analyzed, otherwise the suggested start plus its lead-in.
    pub fn drop_time(&self) -> f64 {
        match &self.analysis {
            Some(analysis) => analysis.best_start,
            None => self.suggested_start_time + buildup_seconds(self.bpm.map(f64::from)),
        }
    }

    /// Track offset that plays the drop `climax_at` seconds into the clip.
    ///
    /// Without a climax moment the drop lands one lead-in after clip start,
    /// which is the plain suggested start.
    pub fn offset_for_climax(&self, climax_at: Option<f64>, clip_secs: f64) -> f64 {
        let climax_at = climax_at.unwrap_or_else(|| buildup_seconds(self.bpm.map(f64::from)));
        clamp_start(self.drop_time() - climax_at, self.duration, clip_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn normalize_db_maps_range() {
        assert!(approx(normalize_db(-60.0), 0.0));
        assert!(approx(normalize_db(0.0), 1.0));
        assert!(approx(normalize_db(-30.0), 0.5));
        assert!(approx(normalize_db(-91.0), 0.0));
        assert!(approx(normalize_db(6.0), 1.0));
        assert!(approx(normalize_db(f64::NAN), 0.0));
    }

    #[test]
    fn buildup_always_in_bounds() {
        assert!(approx(buildup_seconds(None), DEFAULT_BUILDUP_SECS));
        for bpm in 1..=300 {
            let b = buildup_seconds(Some(bpm as f64));
            assert!((MIN_BUILDUP_SECS..=MAX_BUILDUP_SECS).contains(&b), "bpm {bpm} -> {b}");
        }
    }

    #[test]
    fn buildup_at_128_bpm() {
        assert!(approx(buildup_seconds(Some(128.0)), 3.75));
    }

    #[test]
    fn buildup_zero_bpm_uses_default() {
        assert!(approx(buildup_seconds(Some(0.0)), DEFAULT_BUILDUP_SECS));
    }

    #[test]
    fn drop_position_buckets() {
        assert!(approx(estimate_drop_position(200.0), 50.0));
        assert!(approx(estimate_drop_position(400.0), 50.0));
        assert!(approx(estimate_drop_position(150.0), 40.0));
        assert!(approx(estimate_drop_position(130.0), 36.4));
        assert!(approx(estimate_drop_position(90.0), 25.0));
        assert!(approx(estimate_drop_position(70.0), 21.0));
        assert!(approx(estimate_drop_position(40.0), 14.0));
        assert!(approx(estimate_drop_position(30.0), 0.0));
    }

    #[test]
    fn heuristic_scenario_long_track() {
        assert!(approx(heuristic_start(200.0, 15.0, Some(128.0)), 46.25));
    }

    #[test]
    fn heuristic_scenario_short_track() {
        assert!(approx(heuristic_start(20.0, 15.0, None), 0.0));
    }

    #[test]
    fn heuristic_start_is_bounded() {
        for duration in 0..400 {
            let duration = duration as f64;
            for target in [5.0, 15.0, 30.0, 60.0] {
                for bpm in [None, Some(60.0), Some(128.0), Some(200.0)] {
                    let s = heuristic_start(duration, target, bpm);
                    assert!(s >= 0.0);
                    if duration - target > 0.0 {
                        assert!(s <= duration - target, "d={duration} t={target} s={s}");
                    }
                }
            }
        }
    }

    #[test]
    fn best_window_finds_spike() {
        let mut curve = vec![0.2; 120];
        for v in curve.iter_mut().skip(60).take(20) {
            *v = 0.95;
        }
        let (start, energy) = find_best_window(&curve, 15.0, 120.0);
        assert!((60.0..=65.0).contains(&start), "start {start}");
        assert!(approx(energy, 0.95));
    }

    #[test]
    fn best_window_short_track_starts_at_zero() {
        let curve = vec![0.1, 0.1, 0.1, 0.1, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9];
        let (start, _) = find_best_window(&curve, 15.0, 20.0);
        assert!(approx(start, 0.0));
    }

    #[test]
    fn segments_classified_by_energy_and_position() {
        let mut curve = vec![0.2; 4];
        curve.extend(vec![0.5; 4]);
        curve.extend(vec![0.9; 4]);
        curve.extend(vec![0.3; 4]);
        curve.extend(vec![0.1; 4]);
        let segments = segment_curve(&curve, 20.0);
        let types: Vec<_> = segments.iter().map(|s| s.segment_type).collect();
        assert_eq!(
            types,
            vec![
                SegmentType::Intro,
                SegmentType::Verse,
                SegmentType::Chorus,
                SegmentType::Bridge,
                SegmentType::Outro,
            ]
        );
        assert!(approx(segments[4].end, 20.0));
    }

    #[test]
    fn segment_of_empty_curve_is_empty() {
        assert!(segment_curve(&[], 0.0).is_empty());
    }

    #[test]
    fn bpm_is_clamped() {
        let config = BpmEstimatorConfig::default();
        assert_eq!(estimate_bpm(&[], 30.0, &config), 60);
        assert_eq!(estimate_bpm(&[0.5; 10], 0.0, &config), 60);

        // A spike every other sample: 150 peaks in 30 s would be 300 BPM.
        let spiky: Vec<f64> = (0..300).map(|i| if i % 2 == 0 { 0.9 } else { 0.1 }).collect();
        assert_eq!(estimate_bpm(&spiky, 30.0, &config), 200);
    }

    #[test]
    fn bpm_from_regular_pulse() {
        let config = BpmEstimatorConfig::default();
        // One pulse every 5 samples (0.5 s) -> 120 BPM.
        let samples: Vec<f64> = (0..300).map(|i| if i % 5 == 2 { 0.9 } else { 0.3 }).collect();
        assert_eq!(estimate_bpm(&samples, 30.0, &config), 120);
    }

    #[test]
    fn analyzed_start_subtracts_lead_in() {
        let analysis = AudioAnalysis {
            duration: 180.0,
            bpm: 120,
            energy_curve: vec![],
            segments: vec![],
            best_start: 60.0,
            best_energy: 0.9,
        };
        assert!(approx(analyzed_start(&analysis, 15.0), 56.0));
    }

    #[test]
    fn suggested_end_never_exceeds_duration() {
        assert!(approx(suggested_end(10.0, 20.0, 15.0), 20.0));
        assert!(approx(suggested_end(0.0, 0.0, 15.0), 15.0));
    }

    fn analyzed_result(best_start: f64, bpm: u32) -> AudioAnalysisResult {
        let analysis = AudioAnalysis {
            duration: 180.0,
            bpm,
            energy_curve: vec![],
            segments: vec![],
            best_start,
            best_energy: 0.9,
        };
        AudioAnalysisResult {
            asset_id: "a".into(),
            duration: 180.0,
            bpm: Some(bpm),
            suggested_start_time: analyzed_start(&analysis, 15.0),
            suggested_end_time: 0.0,
            analyzed: true,
            analysis: Some(analysis),
        }
    }

    #[test]
    fn drop_lands_on_climax_moment() {
        // 120 BPM -> 4 s lead-in, drop at 60 s.
        let result = analyzed_result(60.0, 120);
        assert!(approx(result.drop_time(), 60.0));
        assert!(approx(result.offset_for_climax(Some(9.0), 15.0), 51.0));
        assert!(approx(result.offset_for_climax(Some(2.5), 15.0), 57.5));
        // No climax line: the plain suggested start.
        assert!(approx(result.offset_for_climax(None, 15.0), 56.0));
    }

    #[test]
    fn climax_offset_stays_inside_track() {
        assert!(approx(analyzed_result(4.0, 120).offset_for_climax(Some(10.0), 15.0), 0.0));
        assert!(approx(analyzed_result(178.0, 120).offset_for_climax(Some(0.0), 15.0), 165.0));
    }

    #[test]
    fn heuristic_drop_is_start_plus_lead_in() {
        let result = AudioAnalysisResult {
            asset_id: "a".into(),
            duration: 200.0,
            bpm: None,
            suggested_start_time: 44.0,
            suggested_end_time: 59.0,
            analyzed: false,
            analysis: None,
        };
        assert!(approx(result.drop_time(), 50.0));
        assert!(approx(result.offset_for_climax(Some(8.0), 15.0), 42.0));
    }
}
