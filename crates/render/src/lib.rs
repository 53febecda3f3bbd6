//! Render engine client library.
//!
//! Provides the render job wire types, the HTTP API wrapper, the
//! [`engine::RenderEngine`] capability trait and the cancellable status
//! poller used by the compose pipeline.

pub mod api;
pub mod engine;
pub mod events;
pub mod messages;
pub mod poller;
