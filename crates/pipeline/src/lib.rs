//! The compose pipeline: script generation, effect tagging, image sourcing
//! through a content-addressed cache, music matching with audio analysis,
//! and render orchestration.
//!
//! External services are reached through traits (`LanguageModel`,
//! `ImageSearchProvider`, `ImageFetcher`, `ObjectStore`, `ImageCacheStore`,
//! `MediaProbe`, `AudioLibrary`, `RenderEngine`) so the worker binary wires
//! real providers and tests wire in-memory fakes.

pub mod audio_analyzer;
pub mod cache_store;
pub mod compose;
pub mod effect_analyzer;
pub mod error;
pub mod image_cache;
pub mod music;
pub mod script_generator;
pub mod sourcing;

pub use compose::{ComposeOrchestrator, ComposeRun};
pub use error::PipelineError;
