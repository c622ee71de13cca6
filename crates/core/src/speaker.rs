//! Speaker tags and per-cue voice resolution.
//!
//! A cue may begin with `[Speaker: Name]` or `【Speaker：Name】` (either
//! bracket shape, ASCII or full-width colon). Cues without a tag inherit
//! the previous cue's speaker; before any tag is seen the reserved name
//! `DEFAULT` applies.

use crate::voicemap::VoiceMap;

/// Reserved speaker name every voice map must carry.
pub const DEFAULT_SPEAKER: &str = "DEFAULT";

/// Extract an optional leading speaker tag, returning the speaker name and
/// the remaining text. Text without a recognised tag comes back unchanged.
pub fn extract_speaker(text: &str) -> (Option<String>, String) {
    let trimmed = text.trim_start();
    for (open, close) in [('[', ']'), ('【', '】')] {
        if let Some(rest) = trimmed.strip_prefix(open) {
            if let Some(end) = rest.find(close) {
                let tag = &rest[..end];
                let lowered = tag.trim_start().to_lowercase();
                if lowered.starts_with("speaker") {
                    if let Some(delim) = tag.find(|c| c == ':' || c == '：') {
                        let name = tag[delim..]
                            .trim_start_matches(|c| c == ':' || c == '：')
                            .trim();
                        if !name.is_empty() {
                            let rest_text =
                                rest[end + close.len_utf8()..].trim_start().to_string();
                            return (Some(name.to_string()), rest_text);
                        }
                    }
                }
            }
        }
    }
    (None, text.to_string())
}

/// Tracks the current speaker across a cue list and resolves each cue to a
/// `(voice_id, clean_text)` pair against a voice map.
#[derive(Debug, Clone)]
pub struct SpeakerTracker {
    current: String,
}

impl SpeakerTracker {
    pub fn new() -> Self {
        Self {
            current: DEFAULT_SPEAKER.to_string(),
        }
    }

    /// Current speaker name (the last tag seen, or `DEFAULT`).
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Resolve one cue: update the tracked speaker from any leading tag,
    /// strip the tag, and look up the voice. Unknown speakers fall back to
    /// the `DEFAULT` voice with a warning.
    pub fn resolve(&mut self, text: &str, voices: &VoiceMap) -> (String, String) {
        let (tag, clean) = extract_speaker(text);
        if let Some(name) = tag {
            self.current = name;
        }
        let voice = match voices.get(&self.current) {
            Some(v) => v.to_string(),
            None => {
                if self.current != DEFAULT_SPEAKER {
                    tracing::warn!(
                        speaker = %self.current,
                        "speaker not in voice map, using DEFAULT voice"
                    );
                }
                voices.default_voice().to_string()
            }
        };
        (voice, clean)
    }
}

impl Default for SpeakerTracker {
    fn default() -> Self {
        Self::new()
    }
}
