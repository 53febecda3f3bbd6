//! Timed script generation from an artist brief.
//!
//! Two phases: an optional grounded web search about the artist, whose
//! summary is folded into the prompt, then a structured generation call.
//! Grounding failure only loses context; generation failure is returned to
//! the caller since there is no safe script to make up.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use beatcut_core::script::{
    normalize_script, normalize_vibe, BpmRange, LinePurpose, Script, ScriptLine, Vibe,
    MAX_SCRIPT_LINES, MIN_SCRIPT_LINES,
};
use beatcut_llm::json::generate_json;
use beatcut_llm::{Citation, GenerateRequest, LanguageModel};

use crate::error::PipelineError;

/// Longest grounding summary folded into the generation prompt.
const MAX_GROUNDING_CHARS: usize = 1500;

/// Search keywords kept after prioritization.
pub const MAX_SEARCH_KEYWORDS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistBrief {
    pub name: String,
    pub genre: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    pub artist: ArtistBrief,
    pub prompt: String,
    pub target_duration: f64,
    #[serde(default)]
    pub trend_keywords: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub use_grounding: bool,
}

fn default_language() -> String {
    "ko".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingSummary {
    pub summary: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptGenerationResult {
    pub script: Script,
    pub vibe: Vibe,
    pub vibe_reason: String,
    pub suggested_bpm_range: BpmRange,
    pub search_keywords: Vec<String>,
    pub effect_recommendation: String,
    pub grounding: Option<GroundingSummary>,
}

// ---------------------------------------------------------------------------
// Model output
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawLine {
    text: String,
    timing: f64,
    duration: f64,
    purpose: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawScriptBody {
    lines: Vec<RawLine>,
    total_duration: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBpmRange {
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawScriptResult {
    script: RawScriptBody,
    vibe: String,
    vibe_reason: String,
    suggested_bpm_range: Option<RawBpmRange>,
    search_keywords: Vec<String>,
    effect_recommendation: String,
}

fn to_bpm_range(raw: Option<RawBpmRange>) -> Option<BpmRange> {
    let raw = raw?;
    let (min, max) = (raw.min?, raw.max?);
    if !(min.is_finite() && max.is_finite()) || min < 0.0 || max < 0.0 {
        return None;
    }
    BpmRange {
        min: min.round() as u32,
        max: max.round() as u32,
    }
    .normalized()
}

/// Trend keywords first, then the model's, deduplicated case-insensitively.
pub fn prioritize_keywords(trend_keywords: &[String], model_keywords: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for keyword in trend_keywords.iter().chain(model_keywords) {
        let trimmed = keyword.trim();
        let folded = trimmed.to_lowercase();
        if trimmed.is_empty() || seen.contains(&folded) {
            continue;
        }
        seen.push(folded);
        out.push(trimmed.to_string());
        if out.len() == MAX_SEARCH_KEYWORDS {
            break;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "\
You write scripts for vertical short-form music promo videos.
Rules:
- 5 to 8 lines in this order of purpose: hook, setup, build, climax, cta.
- The first line is the hook: 2 to 4 punchy words.
- Every other line is 3 to 8 words.
- Give each line a start time (timing) and duration in seconds; lines must not overlap.
- vibe is one of Exciting, Emotional, Pop, Minimal; explain it in vibeReason.
- suggestedBpmRange is the tempo range of music that fits.
- searchKeywords are image search terms: every trend keyword first, then visual \
concepts from the request, then the artist name combined with visual terms.
Answer with JSON only.";

fn script_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "script": {
                "type": "OBJECT",
                "properties": {
                    "lines": {
                        "type": "ARRAY",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "text": { "type": "STRING" },
                                "timing": { "type": "NUMBER" },
                                "duration": { "type": "NUMBER" },
                                "purpose": {
                                    "type": "STRING",
                                    "enum": ["hook", "setup", "build", "climax", "cta"]
                                }
                            },
                            "required": ["text", "timing", "duration", "purpose"]
                        }
                    },
                    "totalDuration": { "type": "NUMBER" }
                },
                "required": ["lines", "totalDuration"]
            },
            "vibe": { "type": "STRING", "enum": ["Exciting", "Emotional", "Pop", "Minimal"] },
            "vibeReason": { "type": "STRING" },
            "suggestedBpmRange": {
                "type": "OBJECT",
                "properties": {
                    "min": { "type": "INTEGER" },
                    "max": { "type": "INTEGER" }
                },
                "required": ["min", "max"]
            },
            "searchKeywords": { "type": "ARRAY", "items": { "type": "STRING" } },
            "effectRecommendation": { "type": "STRING" }
        },
        "required": ["script", "vibe", "vibeReason", "suggestedBpmRange", "searchKeywords"]
    })
}

/// User prompt for the generation call.
pub fn build_user_prompt(request: &ScriptRequest, grounding: Option<&GroundingSummary>) -> String {
    let artist = &request.artist;
    let mut prompt = format!(
        "Artist: {} ({})\nRequest: {}\nTarget duration: {:.0} seconds\nScript language: {}\nLines: {MIN_SCRIPT_LINES}-{MAX_SCRIPT_LINES}",
        artist.name.trim(),
        artist.genre.trim(),
        request.prompt.trim(),
        request.target_duration,
        request.language,
    );
    if let Some(description) = artist.description.as_deref().filter(|d| !d.trim().is_empty()) {
        prompt.push_str(&format!("\nAbout the artist: {}", description.trim()));
    }
    if !request.trend_keywords.is_empty() {
        prompt.push_str(&format!(
            "\nTrend keywords (put ALL of these first in searchKeywords): {}",
            request.trend_keywords.join(", ")
        ));
    }
    if let Some(grounding) = grounding {
        prompt.push_str(&format!("\nRecent context from the web:\n{}", grounding.summary));
    }
    prompt
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct ScriptGenerator {
    model: Arc<dyn LanguageModel>,
}

impl ScriptGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Grounded search about the artist. Failures are logged and dropped.
    pub async fn ground(&self, request: &ScriptRequest) -> Option<GroundingSummary> {
        let artist = &request.artist;
        let question = format!(
            "Summarize in under 150 words what is current about the artist {} ({}): recent releases, \
             visual identity, fandom trends and anything relevant to: {}",
            artist.name.trim(),
            artist.genre.trim(),
            request.prompt.trim(),
        );
        let llm_request = GenerateRequest::text(
            "You are a music marketing researcher. Be factual and concise.",
            question,
        )
        .grounded();

        match self.model.generate(&llm_request).await {
            Ok(response) => {
                tracing::debug!(
                    artist = %artist.name,
                    citations = response.citations.len(),
                    "Grounding search complete",
                );
                Some(GroundingSummary {
                    summary: truncate_chars(response.content.trim(), MAX_GROUNDING_CHARS),
                    citations: response.citations,
                })
            }
            Err(e) => {
                tracing::warn!(artist = %artist.name, error = %e, "Grounding search failed, continuing without it");
                None
            }
        }
    }

    pub async fn generate(&self, request: &ScriptRequest) -> Result<ScriptGenerationResult, PipelineError> {
        let grounding = if request.use_grounding {
            self.ground(request).await
        } else {
            None
        };

        let llm_request = GenerateRequest::json_schema(
            SYSTEM_PROMPT,
            build_user_prompt(request, grounding.as_ref()),
            script_schema(),
        )
        .with_temperature(0.8);

        let (raw, response) =
            generate_json::<RawScriptResult>(self.model.as_ref(), &llm_request).await?;
        tracing::info!(
            model = self.model.name(),
            lines = raw.script.lines.len(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Script generated",
        );

        to_result(raw, request, grounding)
    }
}

fn to_result(
    raw: RawScriptResult,
    request: &ScriptRequest,
    grounding: Option<GroundingSummary>,
) -> Result<ScriptGenerationResult, PipelineError> {
    let lines: Vec<ScriptLine> = raw
        .script
        .lines
        .into_iter()
        .map(|l| ScriptLine {
            text: l.text,
            timing: l.timing,
            duration: l.duration,
            purpose: l.purpose.as_deref().and_then(LinePurpose::parse),
        })
        .collect();
    let script = normalize_script(lines, raw.script.total_duration)
        .map_err(|e| PipelineError::InvalidScript(e.to_string()))?;

    let vibe = normalize_vibe(&raw.vibe);
    let suggested_bpm_range =
        to_bpm_range(raw.suggested_bpm_range).unwrap_or_else(|| vibe.default_bpm_range());

    Ok(ScriptGenerationResult {
        script,
        vibe,
        vibe_reason: raw.vibe_reason,
        suggested_bpm_range,
        search_keywords: prioritize_keywords(&request.trend_keywords, &raw.search_keywords),
        effect_recommendation: raw.effect_recommendation,
        grounding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn request() -> ScriptRequest {
        ScriptRequest {
            artist: ArtistBrief {
                name: "NOVA".into(),
                genre: "kpop".into(),
                description: Some("five-member girl group".into()),
            },
            prompt: "summer comeback teaser".into(),
            target_duration: 15.0,
            trend_keywords: strings(&["beach", "Y2K"]),
            language: "en".into(),
            use_grounding: false,
        }
    }

    fn raw_lines(n: usize) -> Vec<RawLine> {
        (0..n)
            .map(|i| RawLine {
                text: format!("line {i}"),
                timing: i as f64 * 2.0,
                duration: 2.0,
                purpose: Some("build".into()),
            })
            .collect()
    }

    #[test]
    fn trend_keywords_come_first_without_duplicates() {
        let merged = prioritize_keywords(
            &strings(&["Beach", "y2k"]),
            &strings(&["neon", "beach", " Y2K ", "NOVA stage", ""]),
        );
        assert_eq!(merged, strings(&["Beach", "y2k", "neon", "NOVA stage"]));
    }

    #[test]
    fn prompt_mentions_trends_and_grounding() {
        let grounding = GroundingSummary {
            summary: "New single out in June.".into(),
            citations: vec![],
        };
        let prompt = build_user_prompt(&request(), Some(&grounding));
        assert!(prompt.contains("beach, Y2K"));
        assert!(prompt.contains("New single out in June."));
        assert!(prompt.contains("five-member girl group"));
    }

    #[test]
    fn result_is_normalized() {
        let raw = RawScriptResult {
            script: RawScriptBody {
                lines: raw_lines(10),
                total_duration: 12.0,
            },
            vibe: "EXCITING".into(),
            vibe_reason: "upbeat".into(),
            suggested_bpm_range: None,
            search_keywords: strings(&["stage"]),
            effect_recommendation: String::new(),
        };
        let result = to_result(raw, &request(), None).unwrap();
        assert_eq!(result.script.lines.len(), MAX_SCRIPT_LINES);
        assert_eq!(result.script.lines[0].purpose, Some(LinePurpose::Hook));
        assert_eq!(result.script.total_duration, 16.0);
        assert_eq!(result.vibe, Vibe::Exciting);
        assert_eq!(result.suggested_bpm_range, Vibe::Exciting.default_bpm_range());
        assert_eq!(result.search_keywords, strings(&["beach", "Y2K", "stage"]));
    }

    #[test]
    fn inverted_bpm_range_is_fixed() {
        let range = to_bpm_range(Some(RawBpmRange {
            min: Some(128.4),
            max: Some(100.0),
        }))
        .unwrap();
        assert_eq!(range, BpmRange { min: 100, max: 128 });
        assert!(to_bpm_range(Some(RawBpmRange {
            min: Some(-1.0),
            max: Some(90.0),
        }))
        .is_none());
    }

    #[test]
    fn half_a_bpm_range_uses_the_vibe_default() {
        let raw: RawScriptResult = serde_json::from_value(serde_json::json!({
            "script": {
                "lines": [
                    { "text": "a", "timing": 0, "duration": 2, "purpose": "hook" },
                    { "text": "b", "timing": 2, "duration": 2 },
                    { "text": "c", "timing": 4, "duration": 2 },
                    { "text": "d", "timing": 6, "duration": 2 },
                    { "text": "e", "timing": 8, "duration": 2 }
                ],
                "totalDuration": 10
            },
            "vibe": "Emotional",
            "suggestedBpmRange": { "min": 100 }
        }))
        .unwrap();
        let result = to_result(raw, &request(), None).unwrap();
        assert_eq!(result.suggested_bpm_range, Vibe::Emotional.default_bpm_range());
    }

    #[test]
    fn too_few_lines_is_an_error() {
        let raw = RawScriptResult {
            script: RawScriptBody {
                lines: raw_lines(3),
                total_duration: 6.0,
            },
            vibe: "Pop".into(),
            ..Default::default()
        };
        assert_matches!(to_result(raw, &request(), None), Err(PipelineError::InvalidScript(_)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("안녕하세요", 2), "안녕");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
