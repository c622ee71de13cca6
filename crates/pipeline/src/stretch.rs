//! Video stretcher for Mode B.
//!
//! Cue clips are extracted and re-timed so their duration matches the
//! natural-speed speech; gap clips pass through untouched.

use std::path::{Path, PathBuf};

use redub_core::{Cue, Gap, Result};
use redub_media::MediaTool;

/// Re-timing below this deviation from 1.0 is skipped outright.
const RATIO_SKIP_EPSILON: f64 = 0.01;
/// Ratios outside this band usually mean mis-segmented input.
const RATIO_WARN_LOW: f64 = 0.3;
const RATIO_WARN_HIGH: f64 = 3.0;

pub struct VideoStretcher {
    media: MediaTool,
    work: PathBuf,
}

/// A cue's video clip on the new timeline.
pub struct StretchedClip {
    pub path: PathBuf,
    pub ratio: f64,
    /// Set when the ratio fell outside the plausible band.
    pub warning: Option<String>,
}

impl VideoStretcher {
    pub fn new(media: MediaTool, work: impl Into<PathBuf>) -> Self {
        Self {
            media,
            work: work.into(),
        }
    }

    /// Extract a cue's frames and re-time them to `tts_ms`. Blank cues
    /// pass `tts_ms == original` and are never re-timed.
    pub async fn cue_clip(
        &self,
        video: &Path,
        cue: &Cue,
        cue_idx: usize,
        tts_ms: u64,
    ) -> Result<StretchedClip> {
        let original_ms = u64::from(cue.duration_ms());
        let ratio = tts_ms as f64 / original_ms.max(1) as f64;

        let extracted = self.work.join(format!("clip_{cue_idx:04}.mp4"));
        self.media
            .extract_segment(
                video,
                u64::from(cue.start_ms),
                u64::from(cue.end_ms),
                &extracted,
            )
            .await?;

        let warning = if !(RATIO_WARN_LOW..=RATIO_WARN_HIGH).contains(&ratio) {
            let message = format!(
                "cue {cue_idx}: extreme stretch ratio {ratio:.3} (orig {original_ms}ms, tts {tts_ms}ms)"
            );
            tracing::warn!("{message}");
            Some(message)
        } else {
            None
        };

        if (ratio - 1.0).abs() <= RATIO_SKIP_EPSILON {
            return Ok(StretchedClip {
                path: extracted,
                ratio,
                warning,
            });
        }

        let retimed = self.work.join(format!("clip_{cue_idx:04}_retimed.mp4"));
        self.media.retime_video(&extracted, ratio, &retimed).await?;
        let _ = std::fs::remove_file(&extracted);
        Ok(StretchedClip {
            path: retimed,
            ratio,
            warning,
        })
    }

    /// Extract a gap's frames with no re-timing.
    pub async fn gap_clip(&self, video: &Path, gap: &Gap) -> Result<PathBuf> {
        let path = self
            .work
            .join(format!("gap_{:04}_{:04}.mp4", gap.prev_idx, gap.next_idx));
        self.media
            .extract_segment(video, u64::from(gap.start_ms), u64::from(gap.end_ms), &path)
            .await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_bands() {
        assert!((1.005 - 1.0f64).abs() <= RATIO_SKIP_EPSILON);
        assert!(!(RATIO_WARN_LOW..=RATIO_WARN_HIGH).contains(&3.5));
        assert!((RATIO_WARN_LOW..=RATIO_WARN_HIGH).contains(&1.5));
    }
}
