//! Gemini `generateContent` provider.
//!
//! Supports structured JSON output (`responseMimeType` plus an optional
//! `responseSchema`) and Google Search grounding. Grounding sources are
//! surfaced as [`Citation`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::{
    Citation, GenerateRequest, GenerateResponse, LanguageModel, LlmError, ResponseFormat, Usage,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// HTTP client for the Gemini API.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_client(reqwest::Client::new(), DEFAULT_BASE_URL.to_string(), api_key, model)
    }

    /// Reuse an existing [`reqwest::Client`] and point at a custom base URL.
    pub fn with_client(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        model: String,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    // ---- private helpers ----

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let body = build_request_body(request);

        tracing::debug!(
            model = %self.model,
            grounding = request.grounding,
            "Calling Gemini generateContent",
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let parsed: GeminiResponse = response.json().await?;

        into_generate_response(parsed)
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

/// Build the JSON body for `generateContent`.
pub fn build_request_body(request: &GenerateRequest) -> serde_json::Value {
    let (mime, schema) = match &request.response_format {
        ResponseFormat::Text => (None, None),
        ResponseFormat::Json => (Some("application/json"), None),
        ResponseFormat::JsonSchema(schema) => (Some("application/json"), Some(schema.clone())),
    };
    let config = GenerationConfig {
        temperature: request.temperature,
        response_mime_type: mime,
        response_schema: schema,
    };

    let mut body = json!({
        "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
        "contents": [{ "role": "user", "parts": [{ "text": request.user_prompt }] }],
        "generationConfig": config,
    });
    if request.grounding {
        body["tools"] = json!([{ "google_search": {} }]);
    }
    body
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
pub struct Part {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
pub struct GroundingChunk {
    pub web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
pub struct WebSource {
    pub uri: String,
    pub title: Option<String>,
}

/// Flatten the first candidate into a [`GenerateResponse`].
pub fn into_generate_response(response: GeminiResponse) -> Result<GenerateResponse, LlmError> {
    let usage = response
        .usage_metadata
        .map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(LlmError::EmptyResponse { finish_reason: None });
    };

    let content: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(LlmError::EmptyResponse {
            finish_reason: candidate.finish_reason,
        });
    }

    let mut citations: Vec<Citation> = Vec::new();
    for chunk in candidate
        .grounding_metadata
        .map(|g| g.grounding_chunks)
        .unwrap_or_default()
    {
        if let Some(web) = chunk.web {
            if !citations.iter().any(|c| c.uri == web.uri) {
                citations.push(Citation {
                    uri: web.uri,
                    title: web.title,
                });
            }
        }
    }

    Ok(GenerateResponse {
        content,
        usage,
        finish_reason: candidate.finish_reason,
        citations,
    })
}
