//! Core types for the redub timeline reconstruction engine.
//!
//! This crate provides the foundational pieces used across all other
//! crates:
//! - The cue model and its script-stage invariants (text immutability,
//!   ordering, span)
//! - SRT reading/writing
//! - Speaker tags and voice-map resolution
//! - Synthesised-segment records (speech/gap/blank)
//! - The TTS backend trait
//! - The error taxonomy

pub mod cue;
pub mod error;
pub mod lang;
pub mod mode;
pub mod segment;
pub mod speaker;
pub mod subtitle;
pub mod traits;
pub mod voicemap;

pub use cue::{assert_text_equal, cpm, detect_gaps, span, validate_cues, Cue, Gap};
pub use error::{Error, Result};
pub use mode::Mode;
pub use segment::{SegmentInfo, SegmentRole, SyncDiagnostics};
pub use speaker::{extract_speaker, SpeakerTracker, DEFAULT_SPEAKER};
pub use traits::{TtsBackend, TtsError};
pub use voicemap::VoiceMap;
