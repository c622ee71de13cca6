//! Trait seams for pluggable backends.

mod tts;

pub use tts::{TtsBackend, TtsError};
