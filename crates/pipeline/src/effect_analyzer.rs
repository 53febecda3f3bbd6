//! Prompt → mood, genre, intensity and visual effect tags.
//!
//! The model strategy is constrained to the shared vocabularies and its
//! output is filtered against them; when nothing valid survives it fails and
//! the keyword strategy answers instead.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use beatcut_core::effects::{
    bpm_hint, detect_language, extract_keywords, filter_vocabulary, keyword_analysis,
    pad_keywords, suggest_effects, top_up_moods, vibe_intensity, AnalysisSource, EffectAnalysis,
    Intensity, GENRES, MAX_GENRES, MAX_KEYWORDS, MAX_MOODS, MIN_KEYWORDS, MIN_MOODS, MOODS,
};
use beatcut_core::script::Vibe;
use beatcut_llm::json::generate_json;
use beatcut_llm::{GenerateRequest, LanguageModel, LlmError};

#[derive(Debug, Clone, Default)]
pub struct EffectRequest {
    pub prompt: String,
    pub bpm: Option<u32>,
    pub vibe: Option<Vibe>,
}

#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("model returned no moods or genres from the vocabulary")]
    NoValidTags,
}

#[async_trait]
pub trait EffectStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, request: &EffectRequest) -> Result<EffectAnalysis, EffectError>;
}

// ---------------------------------------------------------------------------
// Model strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEffectTags {
    moods: Vec<String>,
    genres: Vec<String>,
    keywords: Vec<String>,
    intensity: String,
}

pub struct ModelEffectStrategy {
    model: Arc<dyn LanguageModel>,
}

impl ModelEffectStrategy {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "moods": { "type": "ARRAY", "items": { "type": "STRING", "enum": MOODS } },
                "genres": { "type": "ARRAY", "items": { "type": "STRING", "enum": GENRES } },
                "keywords": { "type": "ARRAY", "items": { "type": "STRING" } },
                "intensity": { "type": "STRING", "enum": ["low", "medium", "high"] }
            },
            "required": ["moods", "genres", "keywords", "intensity"]
        })
    }

    fn system_prompt() -> String {
        format!(
            "You tag short-form music video ideas for an editing pipeline.\n\
             Pick {MIN_MOODS}-{MAX_MOODS} moods from: {moods}.\n\
             Pick 1-{MAX_GENRES} genres from: {genres}.\n\
             Give {MIN_KEYWORDS}-{MAX_KEYWORDS} short visual keywords and an intensity of low, medium or high.\n\
             Answer with JSON only.",
            moods = MOODS.join(", "),
            genres = GENRES.join(", "),
        )
    }

    fn user_prompt(request: &EffectRequest) -> String {
        let mut prompt = format!("Idea: {}", request.prompt.trim());
        if let Some(bpm) = request.bpm {
            prompt.push_str(&format!("\nMusic: {bpm} BPM ({})", bpm_hint(bpm)));
        }
        if let Some(vibe) = request.vibe {
            prompt.push_str(&format!("\nOverall vibe: {}", vibe.as_str()));
        }
        prompt
    }
}

/// Lowercase, dedup and cap model keywords, topping up from the prompt
/// when the model gave too few.
fn merge_keywords(model_keywords: &[String], prompt: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for keyword in model_keywords {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() && !out.contains(&keyword) {
            out.push(keyword);
        }
        if out.len() == MAX_KEYWORDS {
            return out;
        }
    }
    for keyword in extract_keywords(prompt) {
        if out.len() >= MIN_KEYWORDS {
            break;
        }
        if !out.contains(&keyword) {
            out.push(keyword);
        }
    }
    out
}

/// Validate raw model tags against the vocabularies and fill the gaps.
fn tags_to_analysis(raw: RawEffectTags, request: &EffectRequest) -> Result<EffectAnalysis, EffectError> {
    let mut moods = filter_vocabulary(&raw.moods, MOODS, MAX_MOODS);
    let mut genres = filter_vocabulary(&raw.genres, GENRES, MAX_GENRES);
    if moods.is_empty() && genres.is_empty() {
        return Err(EffectError::NoValidTags);
    }

    let fallback = keyword_analysis(&request.prompt);
    if moods.len() < MIN_MOODS {
        for mood in fallback.moods.iter().cloned() {
            if moods.len() >= MIN_MOODS {
                break;
            }
            if !moods.contains(&mood) {
                moods.push(mood);
            }
        }
    }
    top_up_moods(&mut moods);
    if genres.is_empty() {
        genres = fallback.genres.clone();
    }
    let mut keywords = merge_keywords(&raw.keywords, &request.prompt);
    pad_keywords(&mut keywords, &moods, &genres);

    let intensity = Intensity::parse(&raw.intensity)
        .or_else(|| request.vibe.map(vibe_intensity))
        .unwrap_or(Intensity::Medium);
    let (effects, transitions, color_grade) = suggest_effects(&moods[0], intensity);

    Ok(EffectAnalysis {
        moods,
        genres,
        keywords,
        intensity,
        effects,
        transitions,
        color_grade,
        language: detect_language(&request.prompt).to_string(),
        source: AnalysisSource::Model,
    })
}

#[async_trait]
impl EffectStrategy for ModelEffectStrategy {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn analyze(&self, request: &EffectRequest) -> Result<EffectAnalysis, EffectError> {
        let llm_request =
            GenerateRequest::json_schema(Self::system_prompt(), Self::user_prompt(request), Self::schema())
                .with_temperature(0.3);
        let (raw, _) = generate_json::<RawEffectTags>(self.model.as_ref(), &llm_request).await?;
        tags_to_analysis(raw, request)
    }
}

// ---------------------------------------------------------------------------
// Keyword strategy
// ---------------------------------------------------------------------------

pub struct KeywordEffectStrategy;

#[async_trait]
impl EffectStrategy for KeywordEffectStrategy {
    fn name(&self) -> &'static str {
        "keywords"
    }

    async fn analyze(&self, request: &EffectRequest) -> Result<EffectAnalysis, EffectError> {
        let mut analysis = keyword_analysis(&request.prompt);
        // Without energy words in the prompt, let the vibe decide.
        if analysis.intensity == Intensity::Medium {
            if let Some(vibe) = request.vibe {
                analysis.intensity = vibe_intensity(vibe);
                let (effects, transitions, color_grade) =
                    suggest_effects(&analysis.moods[0], analysis.intensity);
                analysis.effects = effects;
                analysis.transitions = transitions;
                analysis.color_grade = color_grade;
            }
        }
        Ok(analysis)
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

pub struct EffectAnalyzer {
    strategies: Vec<Arc<dyn EffectStrategy>>,
}

impl EffectAnalyzer {
    pub fn new(strategies: Vec<Arc<dyn EffectStrategy>>) -> Self {
        Self { strategies }
    }

    /// Model first, keywords as the fallback.
    pub fn with_model(model: Arc<dyn LanguageModel>) -> Self {
        Self::new(vec![
            Arc::new(ModelEffectStrategy::new(model)),
            Arc::new(KeywordEffectStrategy),
        ])
    }

    pub async fn analyze(&self, request: &EffectRequest) -> EffectAnalysis {
        for strategy in &self.strategies {
            match strategy.analyze(request).await {
                Ok(analysis) => return analysis,
                Err(e) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        error = %e,
                        "Effect analysis strategy failed, trying next",
                    );
                }
            }
        }
        keyword_analysis(&request.prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request(prompt: &str) -> EffectRequest {
        EffectRequest {
            prompt: prompt.into(),
            bpm: Some(128),
            vibe: Some(Vibe::Exciting),
        }
    }

    fn raw(moods: &[&str], genres: &[&str], keywords: &[&str], intensity: &str) -> RawEffectTags {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        RawEffectTags {
            moods: owned(moods),
            genres: owned(genres),
            keywords: owned(keywords),
            intensity: intensity.into(),
        }
    }

    #[test]
    fn out_of_vocabulary_tags_are_dropped() {
        let analysis = tags_to_analysis(
            raw(&["Energetic", "spicy", "dark"], &["KPOP", "polka"], &["neon", "city"], "HIGH"),
            &request("neon city dance night"),
        )
        .unwrap();
        assert_eq!(analysis.moods, vec!["energetic", "dark"]);
        assert_eq!(analysis.genres, vec!["kpop"]);
        assert_eq!(analysis.intensity, Intensity::High);
        assert_eq!(analysis.source, AnalysisSource::Model);
    }

    #[test]
    fn nothing_valid_is_an_error() {
        let result = tags_to_analysis(raw(&["spicy"], &["polka"], &[], "high"), &request("x"));
        assert_matches!(result, Err(EffectError::NoValidTags));
    }

    #[test]
    fn single_mood_is_topped_up() {
        let analysis = tags_to_analysis(
            raw(&["dramatic"], &["edm"], &[], "bogus"),
            &request("summer party on the beach"),
        )
        .unwrap();
        assert!(analysis.moods.len() >= MIN_MOODS);
        assert_eq!(analysis.moods[0], "dramatic");
        // Unparseable intensity falls back to the vibe.
        assert_eq!(analysis.intensity, Intensity::High);
    }

    #[test]
    fn genre_only_output_still_gets_two_moods() {
        let analysis = tags_to_analysis(
            raw(&["angry"], &["edm"], &["laser"], "high"),
            &request("modern laser show"),
        )
        .unwrap();
        assert_eq!(analysis.moods, vec!["modern", "bright"]);
        assert_eq!(analysis.keywords, vec!["laser", "modern", "show", "bright", "edm"]);
    }

    #[test]
    fn keywords_are_topped_up_from_prompt() {
        let analysis = tags_to_analysis(
            raw(&["calm", "bright"], &["indie"], &["Sunset"], "low"),
            &request("golden sunset over quiet ocean waves"),
        )
        .unwrap();
        assert_eq!(analysis.keywords[0], "sunset");
        assert!(analysis.keywords.len() >= MIN_KEYWORDS);
        assert!(analysis.keywords.len() <= MAX_KEYWORDS);
        let unique: std::collections::HashSet<_> = analysis.keywords.iter().collect();
        assert_eq!(unique.len(), analysis.keywords.len());
    }

    #[tokio::test]
    async fn keyword_strategy_uses_vibe_for_neutral_prompts() {
        let analysis = KeywordEffectStrategy
            .analyze(&EffectRequest {
                prompt: "city walk".into(),
                bpm: None,
                vibe: Some(Vibe::Emotional),
            })
            .await
            .unwrap();
        assert_eq!(analysis.intensity, Intensity::Low);
        assert_eq!(analysis.source, AnalysisSource::Keywords);
    }
}
