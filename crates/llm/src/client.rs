//! Provider-neutral request/response types and the [`LanguageModel`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors from a language-model call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Model API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The provider answered but produced no usable text.
    #[error("Model returned no content (finish reason: {finish_reason:?})")]
    EmptyResponse { finish_reason: Option<String> },

    /// The content could not be decoded into the expected shape.
    #[error("Failed to parse model output: {0}")]
    Parse(String),
}

/// Shape of the content the caller expects back.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    /// Any JSON value.
    Json,
    /// JSON matching an OpenAPI-style schema.
    JsonSchema(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub response_format: ResponseFormat,
    /// Ground the answer on live web search. Providers may refuse to combine
    /// grounding with structured output; callers ask for text in that case.
    pub grounding: bool,
    pub temperature: Option<f32>,
}

impl GenerateRequest {
    pub fn text(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            response_format: ResponseFormat::Text,
            grounding: false,
            temperature: None,
        }
    }

    pub fn json_schema(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            response_format: ResponseFormat::JsonSchema(schema),
            ..Self::text(system_prompt, user_prompt)
        }
    }

    pub fn grounded(mut self) -> Self {
        self.grounding = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A web source the grounded answer relied on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub content: String,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    pub citations: Vec<Citation>,
}

/// A text-generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short provider/model label for logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError>;
}
