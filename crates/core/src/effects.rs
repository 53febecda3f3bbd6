//! Effect analysis vocabularies and the deterministic keyword fallback.
//!
//! The model-backed analyzer is constrained to the same vocabularies, so
//! both paths produce comparable tags. Keyword lists are bilingual: Latin
//! and Hangul keywords are both recognized.

use serde::{Deserialize, Serialize};

use crate::script::Vibe;

// ---------------------------------------------------------------------------
// Vocabularies
// ---------------------------------------------------------------------------

pub const MOODS: &[&str] = &[
    "energetic",
    "calm",
    "dramatic",
    "playful",
    "mysterious",
    "romantic",
    "dark",
    "bright",
    "nostalgic",
    "modern",
];

pub const GENRES: &[&str] = &[
    "kpop", "hiphop", "edm", "ballad", "rock", "jazz", "rnb", "indie", "cinematic", "tiktok",
];

/// Fill-in moods, in order, when fewer than [`MIN_MOODS`] were found.
pub const DEFAULT_MOODS: &[&str] = &["modern", "bright"];
pub const DEFAULT_GENRE: &str = "tiktok";

pub const MIN_MOODS: usize = 2;
pub const MAX_MOODS: usize = 4;
pub const MAX_GENRES: usize = 3;
pub const MIN_KEYWORDS: usize = 5;
pub const MAX_KEYWORDS: usize = 10;

const MOOD_KEYWORDS: &[(&str, &[&str])] = &[
    ("energetic", &["energy", "energetic", "hype", "power", "dance", "party", "신나", "에너지", "파워", "댄스"]),
    ("calm", &["calm", "chill", "relax", "peace", "soft", "잔잔", "차분", "편안", "힐링"]),
    ("dramatic", &["dramatic", "epic", "intense", "cinematic", "드라마", "웅장", "강렬"]),
    ("playful", &["fun", "playful", "cute", "happy", "silly", "귀여", "재미", "행복", "발랄"]),
    ("mysterious", &["mystery", "mysterious", "secret", "shadow", "미스터리", "신비", "비밀"]),
    ("romantic", &["love", "romantic", "heart", "romance", "사랑", "로맨틱", "설렘"]),
    ("dark", &["dark", "night", "gothic", "moody", "어두", "밤", "다크"]),
    ("bright", &["bright", "sunny", "summer", "light", "colorful", "밝은", "여름", "햇살"]),
    ("nostalgic", &["retro", "vintage", "nostalgia", "memory", "y2k", "레트로", "추억", "빈티지"]),
];

const GENRE_KEYWORDS: &[(&str, &[&str])] = &[
    ("kpop", &["kpop", "k-pop", "idol", "케이팝", "아이돌"]),
    ("hiphop", &["hiphop", "hip-hop", "rap", "trap", "힙합", "랩"]),
    ("edm", &["edm", "electronic", "house", "techno", "rave", "일렉"]),
    ("ballad", &["ballad", "acoustic", "발라드", "어쿠스틱"]),
    ("rock", &["rock", "guitar", "band", "punk", "록", "밴드"]),
    ("jazz", &["jazz", "swing", "재즈"]),
    ("rnb", &["rnb", "r&b", "soul", "알앤비"]),
    ("indie", &["indie", "lofi", "lo-fi", "인디"]),
    ("cinematic", &["cinematic", "film", "movie", "영화", "시네마틱"]),
];

const HIGH_INTENSITY_KEYWORDS: &[&str] = &[
    "intense", "explosive", "hype", "powerful", "fast", "extreme", "energy", "강렬", "폭발", "빠른",
];

const LOW_INTENSITY_KEYWORDS: &[&str] = &[
    "calm", "soft", "slow", "gentle", "quiet", "chill", "잔잔", "느린", "조용", "부드러",
];

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "of", "to", "in", "on", "for", "with", "is", "are", "be",
    "this", "that", "it", "my", "our", "your", "make", "video", "을", "를", "이", "가", "은",
    "는", "의", "에", "와", "과", "영상",
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

impl Intensity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Which strategy produced an [`EffectAnalysis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    Model,
    Keywords,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectAnalysis {
    pub moods: Vec<String>,
    pub genres: Vec<String>,
    pub keywords: Vec<String>,
    pub intensity: Intensity,
    pub effects: Vec<String>,
    pub transitions: Vec<String>,
    pub color_grade: String,
    pub language: String,
    pub source: AnalysisSource,
}

// ---------------------------------------------------------------------------
// Hints and detection
// ---------------------------------------------------------------------------

/// Qualitative tempo hint injected into the model prompt.
pub fn bpm_hint(bpm: u32) -> &'static str {
    if bpm >= 140 {
        "fast tempo, high energy"
    } else if bpm >= 100 {
        "moderate tempo"
    } else {
        "calm tempo"
    }
}

/// `"ko"` when any Hangul syllable is present, otherwise `"en"`.
pub fn detect_language(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{AC00}'..='\u{D7A3}').contains(&c)) {
        "ko"
    } else {
        "en"
    }
}

/// Keep only vocabulary members (case-insensitive), deduplicated, capped.
pub fn filter_vocabulary(values: &[String], vocabulary: &[&str], max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let lower = value.trim().to_lowercase();
        if vocabulary.contains(&lower.as_str()) && !out.contains(&lower) {
            out.push(lower);
        }
        if out.len() == max {
            break;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Effect suggestions
// ---------------------------------------------------------------------------

/// Visual effects, transitions and color grade for a mood/intensity pair.
pub fn suggest_effects(primary_mood: &str, intensity: Intensity) -> (Vec<String>, Vec<String>, String) {
    let (effects, transitions): (&[&str], &[&str]) = match intensity {
        Intensity::High => (
            &["zoom_punch", "shake", "flash", "chromatic_aberration"],
            &["whip_pan", "glitch", "hard_cut"],
        ),
        Intensity::Medium => (&["ken_burns", "light_leak", "slide"], &["crossfade", "slide", "zoom"]),
        Intensity::Low => (&["slow_zoom", "film_grain", "soft_blur"], &["dissolve", "fade"]),
    };

    let color_grade = match primary_mood {
        "energetic" | "bright" | "playful" => "vibrant",
        "calm" => "soft_pastel",
        "dramatic" | "cinematic" => "teal_orange",
        "dark" | "mysterious" => "moody_low_key",
        "romantic" => "warm",
        "nostalgic" => "vintage_film",
        _ => "clean_neutral",
    };

    (
        effects.iter().map(|s| s.to_string()).collect(),
        transitions.iter().map(|s| s.to_string()).collect(),
        color_grade.to_string(),
    )
}

/// Default intensity implied by a vibe when nothing else is known.
pub fn vibe_intensity(vibe: Vibe) -> Intensity {
    match vibe {
        Vibe::Exciting => Intensity::High,
        Vibe::Pop => Intensity::Medium,
        Vibe::Emotional | Vibe::Minimal => Intensity::Low,
    }
}

// ---------------------------------------------------------------------------
// Keyword fallback
// ---------------------------------------------------------------------------

/// Lowercased whitespace tokens with surrounding punctuation trimmed.
/// Inner `-` and `&` survive, so "k-pop" and "r&b" stay whole.
fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Latin needles must equal a token (a trailing plural `s` is allowed).
/// Hangul needles match inside tokens, since particles attach to words.
fn matches_any(tokens: &[String], needles: &[&str]) -> bool {
    needles.iter().any(|needle| {
        if needle.is_ascii() {
            tokens
                .iter()
                .any(|t| t == needle || t.strip_suffix('s') == Some(*needle))
        } else {
            tokens.iter().any(|t| t.contains(needle))
        }
    })
}

/// Append [`DEFAULT_MOODS`] until there are at least [`MIN_MOODS`].
pub fn top_up_moods(moods: &mut Vec<String>) {
    for mood in DEFAULT_MOODS {
        if moods.len() >= MIN_MOODS {
            break;
        }
        if !moods.iter().any(|m| m == mood) {
            moods.push(mood.to_string());
        }
    }
}

/// Pad short keyword lists with the chosen tags until [`MIN_KEYWORDS`].
///
/// A very short prompt can still come out below the minimum; the list is
/// never filled with words unrelated to the prompt or its tags.
pub fn pad_keywords(keywords: &mut Vec<String>, moods: &[String], genres: &[String]) {
    for tag in moods.iter().chain(genres) {
        if keywords.len() >= MIN_KEYWORDS {
            break;
        }
        if !keywords.contains(tag) {
            keywords.push(tag.clone());
        }
    }
}

/// Whitespace tokens with punctuation trimmed and stop words removed.
pub fn extract_keywords(prompt: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in prompt.split_whitespace() {
        let token = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if token.is_empty() || STOP_WORDS.contains(&token.as_str()) || out.contains(&token) {
            continue;
        }
        out.push(token);
        if out.len() == MAX_KEYWORDS {
            break;
        }
    }
    out
}

/// Classify a prompt with keyword lists only. Never fails.
pub fn keyword_analysis(prompt: &str) -> EffectAnalysis {
    let tokens = tokens(prompt);

    let mut moods: Vec<String> = MOOD_KEYWORDS
        .iter()
        .filter(|(_, words)| matches_any(&tokens, words))
        .map(|(mood, _)| mood.to_string())
        .take(MAX_MOODS)
        .collect();
    top_up_moods(&mut moods);

    let mut genres: Vec<String> = GENRE_KEYWORDS
        .iter()
        .filter(|(_, words)| matches_any(&tokens, words))
        .map(|(genre, _)| genre.to_string())
        .take(MAX_GENRES)
        .collect();
    if genres.is_empty() {
        genres.push(DEFAULT_GENRE.to_string());
    }

    let intensity = if matches_any(&tokens, HIGH_INTENSITY_KEYWORDS) {
        Intensity::High
    } else if matches_any(&tokens, LOW_INTENSITY_KEYWORDS) {
        Intensity::Low
    } else {
        Intensity::Medium
    };

    let (effects, transitions, color_grade) = suggest_effects(&moods[0], intensity);
    let mut keywords = extract_keywords(prompt);
    pad_keywords(&mut keywords, &moods, &genres);

    EffectAnalysis {
        moods,
        genres,
        keywords,
        intensity,
        effects,
        transitions,
        color_grade,
        language: detect_language(prompt).to_string(),
        source: AnalysisSource::Keywords,
    }
}
