//! Decoding structured model output.
//!
//! Models occasionally wrap JSON in Markdown fences or add a sentence of
//! prose around it even when asked not to. [`extract_json`] recovers the
//! JSON body before deserializing.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::client::{GenerateRequest, GenerateResponse, LanguageModel, LlmError};

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("fence pattern is valid")
});

/// Return the JSON portion of `content`.
///
/// Prefers a fenced block; otherwise slices from the first `{` or `[` to the
/// matching last `}` or `]`.
pub fn extract_json(content: &str) -> &str {
    if let Some(body) = FENCE.captures(content).and_then(|c| c.get(1)) {
        return body.as_str();
    }
    let trimmed = content.trim();
    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if e > s => &trimmed[s..=e],
        _ => trimmed,
    }
}

/// Deserialize model content into `T`.
pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    serde_json::from_str(extract_json(content)).map_err(|e| LlmError::Parse(e.to_string()))
}

/// Call the model and decode its content as `T`.
pub async fn generate_json<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    request: &GenerateRequest,
) -> Result<(T, GenerateResponse), LlmError> {
    let response = model.generate(request).await?;
    let value = parse_json(&response.content)?;
    Ok((value, response))
}
