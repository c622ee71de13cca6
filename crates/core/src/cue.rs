//! Cue model and script-stage invariants.
//!
//! A [`Cue`] is a timed subtitle unit; a cue list flows through the
//! pipeline as a new vector per transform. Script-stage transforms may
//! move boundaries but must never touch text — [`assert_text_equal`] is
//! the gate every one of them runs through.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timed subtitle unit. `start_ms < end_ms` always holds for validated
/// lists; the visual duration is `end_ms - start_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub start_ms: u32,
    pub end_ms: u32,
    pub text: String,
}

impl Cue {
    pub fn new(start_ms: u32, end_ms: u32, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    /// Visual duration in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Character count of the trimmed text (Unicode scalar values).
    pub fn char_count(&self) -> usize {
        self.text.trim().chars().count()
    }

    /// Characters per minute over the visual duration.
    pub fn cpm(&self) -> f64 {
        cpm(&self.text, u64::from(self.duration_ms()))
    }

    /// True when the trimmed text is empty; blank cues are dubbed as
    /// silence of their visual duration.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Characters per minute: `chars / (duration_ms / 60000)`. Zero-duration
/// cues with text count as infinitely dense.
pub fn cpm(text: &str, duration_ms: u64) -> f64 {
    let chars = text.trim().chars().count();
    if duration_ms == 0 {
        return if chars > 0 { f64::INFINITY } else { 0.0 };
    }
    chars as f64 / (duration_ms as f64 / 60_000.0)
}

/// Inter-cue silence exceeding the gap threshold. Derived from a cue
/// list, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    pub prev_idx: usize,
    pub next_idx: usize,
    pub start_ms: u32,
    pub end_ms: u32,
    pub duration_ms: u32,
}

/// Detect gaps longer than `threshold_ms` between consecutive cues.
pub fn detect_gaps(cues: &[Cue], threshold_ms: u32) -> Vec<Gap> {
    let mut gaps = Vec::new();
    for i in 0..cues.len().saturating_sub(1) {
        let current_end = cues[i].end_ms;
        let next_start = cues[i + 1].start_ms;
        if next_start > current_end {
            let duration = next_start - current_end;
            if duration > threshold_ms {
                gaps.push(Gap {
                    prev_idx: i,
                    next_idx: i + 1,
                    start_ms: current_end,
                    end_ms: next_start,
                    duration_ms: duration,
                });
            }
        }
    }
    gaps
}

/// Validate the ordering and no-overlap invariants of an input cue list.
/// Empty lists and overlapping cues are rejected.
pub fn validate_cues(cues: &[Cue]) -> Result<()> {
    if cues.is_empty() {
        return Err(Error::InvalidInput("empty cue list".into()));
    }
    for (i, cue) in cues.iter().enumerate() {
        if cue.start_ms >= cue.end_ms {
            return Err(Error::Ordering {
                index: i,
                reason: format!("start {} >= end {}", cue.start_ms, cue.end_ms),
            });
        }
        if i > 0 {
            if cue.start_ms < cues[i - 1].start_ms {
                return Err(Error::Ordering {
                    index: i,
                    reason: "start times not monotonic".into(),
                });
            }
            if cue.start_ms < cues[i - 1].end_ms {
                return Err(Error::Ordering {
                    index: i,
                    reason: format!(
                        "overlaps previous cue ending at {}",
                        cues[i - 1].end_ms
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Text-immutability gate. Every script-stage transform runs its output
/// through this before handing the list on; a single differing position
/// (whitespace included) fails the run.
pub fn assert_text_equal(before: &[Cue], after: &[Cue]) -> Result<()> {
    if before.len() != after.len() {
        return Err(Error::TextMutation {
            index: before.len().min(after.len()),
        });
    }
    for (i, (b, a)) in before.iter().zip(after.iter()).enumerate() {
        if b.text != a.text {
            return Err(Error::TextMutation { index: i });
        }
    }
    Ok(())
}

/// Overall span `(first start, last end)` of a non-empty cue list.
pub fn span(cues: &[Cue]) -> Option<(u32, u32)> {
    match (cues.first(), cues.last()) {
        (Some(first), Some(last)) => Some((first.start_ms, last.end_ms)),
        _ => None,
    }
}
