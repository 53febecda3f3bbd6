//! Script types, vibe vocabulary and script normalization.
//!
//! A script is a short sequence of timed caption lines that drives the
//! slideshow. Model output is never trusted as-is: [`normalize_script`]
//! enforces the line-count, hook-first and non-overlap invariants and
//! [`normalize_vibe`] coerces the vibe label into the fixed set.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const MIN_SCRIPT_LINES: usize = 5;
pub const MAX_SCRIPT_LINES: usize = 8;

/// Default per-line duration when the model omits one.
pub const DEFAULT_LINE_DURATION_SECS: f64 = 2.0;

// ---------------------------------------------------------------------------
// Line purpose
// ---------------------------------------------------------------------------

/// Narrative role of a script line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinePurpose {
    Hook,
    Setup,
    Build,
    Climax,
    Cta,
}

impl LinePurpose {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hook" => Some(Self::Hook),
            "setup" => Some(Self::Setup),
            "build" => Some(Self::Build),
            "climax" => Some(Self::Climax),
            "cta" => Some(Self::Cta),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    pub text: String,
    /// Seconds from clip start.
    pub timing: f64,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<LinePurpose>,
}

impl ScriptLine {
    pub fn end(&self) -> f64 {
        self.timing + self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub lines: Vec<ScriptLine>,
    pub total_duration: f64,
}

impl Script {
    /// Timing of the first climax line, if the script has one.
    pub fn climax_timing(&self) -> Option<f64> {
        self.lines
            .iter()
            .find(|l| l.purpose == Some(LinePurpose::Climax))
            .map(|l| l.timing)
    }
}

// ---------------------------------------------------------------------------
// Vibe
// ---------------------------------------------------------------------------

/// Overall feel of the video. Drives music matching and transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Vibe {
    Exciting,
    Emotional,
    #[default]
    Pop,
    Minimal,
}

impl Vibe {
    pub const ALL: [Vibe; 4] = [Vibe::Exciting, Vibe::Emotional, Vibe::Pop, Vibe::Minimal];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exciting => "Exciting",
            Self::Emotional => "Emotional",
            Self::Pop => "Pop",
            Self::Minimal => "Minimal",
        }
    }

    /// Tempo range offered when the model does not suggest one.
    pub fn default_bpm_range(self) -> BpmRange {
        match self {
            Self::Exciting => BpmRange { min: 120, max: 140 },
            Self::Emotional => BpmRange { min: 70, max: 90 },
            Self::Pop => BpmRange { min: 100, max: 120 },
            Self::Minimal => BpmRange { min: 80, max: 110 },
        }
    }
}

/// Capitalize the first letter, lowercase the rest, and match against the
/// vibe set. Unrecognized labels become [`Vibe::Pop`].
pub fn normalize_vibe(raw: &str) -> Vibe {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    let cased: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    };
    Vibe::ALL
        .into_iter()
        .find(|v| v.as_str() == cased)
        .unwrap_or_default()
}

/// Inclusive tempo range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BpmRange {
    pub min: u32,
    pub max: u32,
}

impl BpmRange {
    /// Swap inverted bounds and reject empty ranges.
    pub fn normalized(self) -> Option<Self> {
        if self.min == 0 && self.max == 0 {
            return None;
        }
        Some(Self {
            min: self.min.min(self.max),
            max: self.min.max(self.max),
        })
    }

    pub fn contains(&self, bpm: u32) -> bool {
        (self.min..=self.max).contains(&bpm)
    }

    pub fn center(&self) -> f64 {
        (self.min as f64 + self.max as f64) / 2.0
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Enforce script invariants on model output.
///
/// - more than [`MAX_SCRIPT_LINES`] lines are truncated;
/// - fewer than [`MIN_SCRIPT_LINES`] non-empty lines is an error;
/// - the first line's purpose is forced to hook;
/// - each line starts no earlier than the previous line ends;
/// - `total_duration` covers the last line.
pub fn normalize_script(mut lines: Vec<ScriptLine>, total_duration: f64) -> Result<Script, CoreError> {
    lines.retain(|l| !l.text.trim().is_empty());

    if lines.len() < MIN_SCRIPT_LINES {
        return Err(CoreError::Validation(format!(
            "Script must have at least {MIN_SCRIPT_LINES} lines, got {}",
            lines.len()
        )));
    }
    lines.truncate(MAX_SCRIPT_LINES);

    let mut cursor = 0.0f64;
    for line in &mut lines {
        line.text = line.text.trim().to_string();
        if !(line.duration.is_finite() && line.duration > 0.0) {
            line.duration = DEFAULT_LINE_DURATION_SECS;
        }
        if !line.timing.is_finite() || line.timing < cursor {
            line.timing = cursor;
        }
        cursor = line.end();
    }
    lines[0].purpose = Some(LinePurpose::Hook);

    let total_duration = if total_duration.is_finite() {
        total_duration.max(cursor)
    } else {
        cursor
    };

    Ok(Script {
        lines,
        total_duration,
    })
}

/// Check script invariants without modifying anything.
pub fn validate_script(script: &Script) -> Result<(), CoreError> {
    let count = script.lines.len();
    if !(MIN_SCRIPT_LINES..=MAX_SCRIPT_LINES).contains(&count) {
        return Err(CoreError::Validation(format!(
            "Script must have {MIN_SCRIPT_LINES}-{MAX_SCRIPT_LINES} lines, got {count}"
        )));
    }
    if script.lines[0].purpose != Some(LinePurpose::Hook) {
        return Err(CoreError::Validation("First script line must be a hook".into()));
    }
    for pair in script.lines.windows(2) {
        if pair[1].timing < pair[0].end() {
            return Err(CoreError::Validation(format!(
                "Script line at {:.2}s overlaps the previous line ending at {:.2}s",
                pair[1].timing,
                pair[0].end()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn line(text: &str, timing: f64, duration: f64, purpose: Option<LinePurpose>) -> ScriptLine {
        ScriptLine {
            text: text.to_string(),
            timing,
            duration,
            purpose,
        }
    }

    fn sample_lines(n: usize) -> Vec<ScriptLine> {
        (0..n)
            .map(|i| line(&format!("line {i}"), i as f64 * 2.0, 2.0, Some(LinePurpose::Build)))
            .collect()
    }

    #[test]
    fn vibe_casing_is_normalized() {
        for raw in ["EXCITING", "exciting", "ExcItInG", "  exciting "] {
            assert_eq!(normalize_vibe(raw), Vibe::Exciting);
        }
        assert_eq!(normalize_vibe("minimal"), Vibe::Minimal);
        assert_eq!(normalize_vibe("EMOTIONAL"), Vibe::Emotional);
    }

    #[test]
    fn unknown_vibe_becomes_pop() {
        assert_eq!(normalize_vibe("chill"), Vibe::Pop);
        assert_eq!(normalize_vibe(""), Vibe::Pop);
        assert_eq!(normalize_vibe("Excitng"), Vibe::Pop);
    }

    #[test]
    fn purpose_parse_is_case_insensitive() {
        assert_eq!(LinePurpose::parse("CTA"), Some(LinePurpose::Cta));
        assert_eq!(LinePurpose::parse("outro"), None);
    }

    #[test]
    fn too_few_lines_is_an_error() {
        assert_matches!(normalize_script(sample_lines(4), 15.0), Err(CoreError::Validation(_)));
    }

    #[test]
    fn blank_lines_do_not_count() {
        let mut lines = sample_lines(4);
        lines.push(line("   ", 8.0, 2.0, None));
        assert_matches!(normalize_script(lines, 15.0), Err(CoreError::Validation(_)));
    }

    #[test]
    fn extra_lines_are_truncated_and_hook_forced() {
        let script = normalize_script(sample_lines(11), 15.0).unwrap();
        assert_eq!(script.lines.len(), MAX_SCRIPT_LINES);
        assert_eq!(script.lines[0].purpose, Some(LinePurpose::Hook));
        validate_script(&script).unwrap();
    }

    #[test]
    fn overlapping_lines_are_shifted() {
        let lines = vec![
            line("Wait for it", 0.0, 3.0, Some(LinePurpose::Hook)),
            line("b", 1.0, 2.0, None),
            line("c", 1.5, 2.0, None),
            line("d", 9.0, f64::NAN, None),
            line("e", 2.0, 2.0, Some(LinePurpose::Cta)),
        ];
        let script = normalize_script(lines, 10.0).unwrap();
        let timings: Vec<f64> = script.lines.iter().map(|l| l.timing).collect();
        assert_eq!(timings, vec![0.0, 3.0, 5.0, 9.0, 11.0]);
        assert_eq!(script.total_duration, 13.0);
        validate_script(&script).unwrap();
    }

    #[test]
    fn validate_rejects_missing_hook() {
        let script = Script {
            lines: sample_lines(5),
            total_duration: 10.0,
        };
        assert_matches!(validate_script(&script), Err(CoreError::Validation(_)));
    }

    #[test]
    fn bpm_range_normalization() {
        assert_eq!(
            BpmRange { min: 140, max: 120 }.normalized(),
            Some(BpmRange { min: 120, max: 140 })
        );
        assert_eq!(BpmRange { min: 0, max: 0 }.normalized(), None);
        assert!(BpmRange { min: 100, max: 120 }.contains(120));
        assert_eq!(BpmRange { min: 100, max: 120 }.center(), 110.0);
    }
}
