//! Language-model capability.
//!
//! [`client::LanguageModel`] is the object-safe interface the pipeline
//! depends on; [`gemini::GeminiClient`] is the HTTP provider used in
//! production. Responses can be requested as free text or as JSON
//! constrained by a schema, and generation can optionally be grounded on
//! live web search results.

pub mod client;
pub mod gemini;
pub mod json;

pub use client::{
    Citation, GenerateRequest, GenerateResponse, LanguageModel, LlmError, ResponseFormat, Usage,
};
