//! Synthesised-segment records and sync diagnostics.
//!
//! Gaps and blanks are first-class segments rather than incidental
//! silences; that is what keeps the Mode B timeline arithmetic closed-form.

use serde::{Deserialize, Serialize};

/// What a synthesised segment carries on the new timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentRole {
    /// Synthesised speech for a cue.
    Speech,
    /// Inter-cue silence paired with un-retimed video.
    Gap,
    /// Whitespace-only cue rendered as silence of its original duration.
    Blank,
}

/// Per-segment accounting for one assembly run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Index of the owning cue (for gaps, the cue the gap follows).
    pub cue_idx: usize,
    pub original_start_ms: u32,
    pub original_end_ms: u32,
    pub original_ms: u32,
    pub tts_ms: u64,
    pub new_start_ms: u64,
    pub new_end_ms: u64,
    /// `tts_ms / original_ms` for speech in Mode B; 1.0 for gap and blank.
    pub stretch_ratio: f64,
    pub role: SegmentRole,
}

/// Aggregate timing diagnostics emitted alongside a Mode B assembly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncDiagnostics {
    pub segments: Vec<SegmentInfo>,
    pub total_original_ms: u64,
    pub total_new_ms: u64,
    pub overall_ratio: f64,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(
            serde_json::to_string(&SegmentRole::Blank).unwrap(),
            "\"blank\""
        );
        let role: SegmentRole = serde_json::from_str("\"gap\"").unwrap();
        assert_eq!(role, SegmentRole::Gap);
    }
}
