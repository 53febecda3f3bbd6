//! Worker process support: configuration, provider wiring, the background
//! cache cleanup loop and one-shot compose runs.

pub mod cleanup;
pub mod config;
pub mod oneshot;
pub mod services;
