//! Audio fitter: reconcile synthesised duration with visual duration.
//!
//! Shorter-than-target clips get trailing silence; longer clips are
//! time-stretched (rubberband when installed, atempo chain otherwise);
//! near-equal clips are copied. Clustered synthesis fits the whole cluster
//! to its total visual duration, then re-splits into per-cue chunks.

use std::path::{Path, PathBuf};

use redub_config::FitConfig;
use redub_core::{Cue, Error, Result};
use redub_media::wav::wav_duration_ms;
use redub_media::{AudioClip, MediaTool};

use crate::orchestrator::SynthesizedCue;

/// Clips within one envelope frame of the target are copied, not
/// stretched.
const FRAME_TOLERANCE_MS: u64 = 20;

pub struct Fitter {
    media: MediaTool,
    cfg: FitConfig,
    sample_rate: u32,
    work: PathBuf,
}

impl Fitter {
    pub fn new(media: MediaTool, cfg: FitConfig, sample_rate: u32, work: impl Into<PathBuf>) -> Self {
        Self {
            media,
            cfg,
            sample_rate,
            work: work.into(),
        }
    }

    /// Fit one cue's synthesis to its visual duration. Blank or
    /// substituted cues become silence of exactly the visual duration.
    pub async fn fit_cue(&self, cue: &Cue, synth: &SynthesizedCue, seq: usize) -> Result<PathBuf> {
        let target_ms = u64::from(cue.duration_ms());
        let out = self.work.join(format!("fit_{seq:04}.wav"));
        match &synth.path {
            None => {
                AudioClip::silence(target_ms, self.sample_rate)
                    .write(&out)
                    .map_err(Error::from)?;
                Ok(out)
            }
            Some(path) => {
                let source = self
                    .maybe_trim(path, cue.cpm(), target_ms, seq)
                    .await?;
                self.fit_to(&source, target_ms, &out).await?;
                Ok(out)
            }
        }
    }

    /// Fit a cluster's single synthesis to the cluster's total visual
    /// duration, then split into per-cue chunks matching each member's
    /// visual duration. Returns `(cue index, chunk path)` pairs in cue
    /// order.
    pub async fn fit_cluster(
        &self,
        cues: &[Cue],
        members: &[usize],
        synth: &SynthesizedCue,
        seq: usize,
    ) -> Result<Vec<(usize, PathBuf)>> {
        let durations: Vec<u64> = members
            .iter()
            .map(|&i| u64::from(cues[i].duration_ms()))
            .collect();
        let total_ms: u64 = durations.iter().sum();

        let fitted = self.work.join(format!("cluster_{seq:04}.wav"));
        match &synth.path {
            None => {
                AudioClip::silence(total_ms, self.sample_rate)
                    .write(&fitted)
                    .map_err(Error::from)?;
            }
            Some(path) => {
                self.fit_to(path, total_ms, &fitted).await?;
            }
        }

        let clip = AudioClip::read(&fitted).map_err(Error::from)?;
        let chunks = if self.cfg.smart_split {
            clip.split_by_durations_snapped(&durations, 20, 250)
        } else {
            clip.split_by_durations(&durations)
        };

        let mut out = Vec::with_capacity(members.len());
        for (k, (&cue_idx, chunk)) in members.iter().zip(chunks.iter()).enumerate() {
            let path = self.work.join(format!("fit_{seq:04}_{k:02}.wav"));
            chunk.write(&path).map_err(Error::from)?;
            out.push((cue_idx, path));
        }
        Ok(out)
    }

    /// Pad, stretch, or copy `src` to exactly `target_ms` at `dst`.
    async fn fit_to(&self, src: &Path, target_ms: u64, dst: &Path) -> Result<()> {
        let src_ms = wav_duration_ms(src).map_err(Error::from)?;

        if src_ms + FRAME_TOLERANCE_MS < target_ms {
            let mut clip = AudioClip::read(src).map_err(Error::from)?;
            clip.pad_to(target_ms);
            clip.write(dst).map_err(Error::from)?;
        } else if src_ms > target_ms + FRAME_TOLERANCE_MS {
            self.stretch(src, dst, src_ms, target_ms).await?;
        } else {
            let mut clip = AudioClip::read(src).map_err(Error::from)?;
            clip.pad_to(target_ms);
            clip.write(dst).map_err(Error::from)?;
        }
        Ok(())
    }

    /// Time-stretch `src` down to `target_ms`. Prefers the
    /// phase-preserving rubberband binary; an absent binary falls back to
    /// the ffmpeg atempo chain.
    async fn stretch(&self, src: &Path, dst: &Path, src_ms: u64, target_ms: u64) -> Result<()> {
        let time_ratio = target_ms as f64 / src_ms as f64;
        match self.media.stretch_audio_rubberband(src, dst, time_ratio).await {
            Ok(()) => return Ok(()),
            Err(redub_media::MediaError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("rubberband not installed, using atempo chain");
            }
            Err(e) => {
                tracing::warn!(error = %e, "rubberband stretch failed, using atempo chain");
            }
        }
        let tempo = src_ms as f64 / target_ms as f64;
        self.media
            .stretch_audio_atempo(src, dst, tempo)
            .await
            .map_err(Error::from)
    }

    /// Leading-silence trim, gated so short dense cues never lose
    /// content. Any trouble falls back to the untrimmed source.
    async fn maybe_trim(
        &self,
        src: &Path,
        cue_cpm: f64,
        target_ms: u64,
        seq: usize,
    ) -> Result<PathBuf> {
        let eligible = self.cfg.trim_silence
            && cue_cpm <= f64::from(self.cfg.trim_max_cpm)
            && target_ms >= u64::from(self.cfg.trim_min_target_ms);
        if !eligible {
            return Ok(src.to_path_buf());
        }
        let trimmed = self.work.join(format!("trim_{seq:04}.wav"));
        match self.media.remove_edge_silence(src, &trimmed).await {
            Ok(()) => match wav_duration_ms(&trimmed) {
                Ok(ms) if ms > 0 => Ok(trimmed),
                _ => Ok(src.to_path_buf()),
            },
            Err(e) => {
                tracing::warn!(error = %e, "silence trim failed, keeping original clip");
                Ok(src.to_path_buf())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redub_media::wav::wav_duration_ms;

    fn fitter(dir: &Path) -> Fitter {
        let cfg = FitConfig {
            trim_silence: false,
            ..FitConfig::default()
        };
        Fitter::new(MediaTool::new(), cfg, 48_000, dir)
    }

    fn write_tone(dir: &Path, name: &str, duration_ms: u64) -> PathBuf {
        let path = dir.join(name);
        let samples = (0..(48 * duration_ms) as usize)
            .map(|i| ((i % 480) as f32 / 480.0) - 0.5)
            .collect();
        AudioClip::new(samples, 48_000).write(&path).unwrap();
        path
    }

    fn synth(path: Option<PathBuf>, duration_ms: u64) -> SynthesizedCue {
        SynthesizedCue {
            index: 0,
            path,
            duration_ms,
            cached: false,
            substituted: false,
        }
    }

    #[tokio::test]
    async fn test_short_tts_padded_with_silence() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_tone(dir.path(), "tts.wav", 1500);
        let cue = Cue::new(0, 2000, "hello");
        let out = fitter(dir.path())
            .fit_cue(&cue, &synth(Some(src), 1500), 0)
            .await
            .unwrap();
        assert_eq!(wav_duration_ms(&out).unwrap(), 2000);

        // The padding must be digital silence.
        let clip = AudioClip::read(&out).unwrap();
        let tail = &clip.samples[(48 * 1520) as usize..];
        assert!(tail.iter().all(|s| s.abs() < 1e-3));
    }

    #[tokio::test]
    async fn test_blank_cue_becomes_exact_silence() {
        let dir = tempfile::tempdir().unwrap();
        let cue = Cue::new(1000, 3500, "   ");
        let out = fitter(dir.path())
            .fit_cue(&cue, &synth(None, 0), 3)
            .await
            .unwrap();
        assert_eq!(wav_duration_ms(&out).unwrap(), 2500);
        let clip = AudioClip::read(&out).unwrap();
        assert!(clip.samples.iter().all(|s| *s == 0.0));
    }

    #[tokio::test]
    async fn test_near_equal_clip_copied() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_tone(dir.path(), "tts.wav", 2010);
        let cue = Cue::new(0, 2000, "hi");
        let out = fitter(dir.path())
            .fit_cue(&cue, &synth(Some(src), 2010), 1)
            .await
            .unwrap();
        // Within one frame: copied through, not stretched.
        assert_eq!(wav_duration_ms(&out).unwrap(), 2010);
    }

    #[tokio::test]
    async fn test_cluster_split_matches_member_durations() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_tone(dir.path(), "cluster.wav", 3000);
        let cues = vec![
            Cue::new(0, 1000, "a"),
            Cue::new(1000, 2000, "b"),
            Cue::new(2000, 3000, "c"),
        ];
        let members = vec![0, 1, 2];
        let parts = fitter(dir.path())
            .fit_cluster(&cues, &members, &synth(Some(src), 3000), 0)
            .await
            .unwrap();
        assert_eq!(parts.len(), 3);
        for (k, (cue_idx, path)) in parts.iter().enumerate() {
            assert_eq!(*cue_idx, k);
            let ms = wav_duration_ms(path).unwrap() as i64;
            assert!((ms - 1000).abs() <= FRAME_TOLERANCE_MS as i64, "chunk {k} was {ms}ms");
        }
    }
}
