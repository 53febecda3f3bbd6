//! Pure domain logic for the compose pipeline.
//!
//! Nothing in this crate touches the database or the network. Audio
//! heuristics, cache-key derivation, script and effect vocabularies, and
//! the compose state machine live here so they can be unit tested in
//! isolation. The one exception is [`ffmpeg`], which shells out to the
//! ffmpeg/ffprobe binaries.

pub mod audio;
pub mod cache_keys;
pub mod compose;
pub mod effects;
pub mod error;
pub mod ffmpeg;
pub mod hashing;
pub mod script;
pub mod types;
