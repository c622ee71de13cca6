//! Timeline assembly.
//!
//! Mode A: one audio track interleaving fitted speech with silences,
//! stretched over the unmodified source video. Mode B: a new video from
//! stretched cue clips and untouched gap clips, a new audio track from
//! natural-speed speech and gap silences, and a new cue timeline.

use std::path::{Path, PathBuf};

use redub_core::{
    detect_gaps, Cue, Error, Gap, Result, SegmentInfo, SegmentRole, SyncDiagnostics,
};
use redub_media::wav::wav_duration_ms;
use redub_media::{AudioClip, MediaTool};

use crate::orchestrator::SynthesizedCue;
use crate::stretch::VideoStretcher;

/// Allowed audio/video length divergence after Mode B assembly.
const LENGTH_TOLERANCE_MS: u64 = 100;

/// Mode A: concatenate leading silence, fitted cue audio, inter-cue
/// silences, and trailing silence out to the video duration. Returns the
/// mixed WAV path.
pub async fn assemble_mode_a(
    media: &MediaTool,
    cues: &[Cue],
    fitted: &[PathBuf],
    video_duration_ms: u64,
    sample_rate: u32,
    work: &Path,
) -> Result<PathBuf> {
    if cues.len() != fitted.len() {
        return Err(Error::Invariant(format!(
            "assembly input mismatch: {} cues, {} clips",
            cues.len(),
            fitted.len()
        )));
    }

    let mut ordered: Vec<PathBuf> = Vec::with_capacity(fitted.len() * 2 + 2);
    let mut silence_seq = 0usize;
    let mut write_silence = |ms: u64| -> Result<PathBuf> {
        let path = work.join(format!("silence_{silence_seq:04}.wav"));
        silence_seq += 1;
        AudioClip::silence(ms, sample_rate)
            .write(&path)
            .map_err(Error::from)?;
        Ok(path)
    };

    let lead_ms = u64::from(cues[0].start_ms);
    if lead_ms > 0 {
        ordered.push(write_silence(lead_ms)?);
    }
    for (i, clip) in fitted.iter().enumerate() {
        ordered.push(clip.clone());
        if i + 1 < cues.len() {
            let gap_ms = u64::from(cues[i + 1].start_ms).saturating_sub(u64::from(cues[i].end_ms));
            if gap_ms > 0 {
                ordered.push(write_silence(gap_ms)?);
            }
        }
    }
    let tail_ms = video_duration_ms.saturating_sub(u64::from(cues[cues.len() - 1].end_ms));
    if tail_ms > 0 {
        ordered.push(write_silence(tail_ms)?);
    }

    let mix = work.join("mix.wav");
    media.concat_audio(&ordered, &mix).await?;
    tracing::info!(
        segments = ordered.len(),
        mix_ms = wav_duration_ms(&mix).unwrap_or(0),
        "mode A audio assembled"
    );
    Ok(mix)
}

/// Everything Mode B assembly produces.
pub struct ModeBOutput {
    pub video: PathBuf,
    pub audio: PathBuf,
    /// New cue timeline: cue i starts at the cumulative offset and lasts
    /// its speech duration, with gaps in between.
    pub timeline: Vec<Cue>,
    pub diagnostics: SyncDiagnostics,
}

/// Mode B: stretch cue clips to natural-speed speech, keep gap clips
/// untouched, and concatenate both tracks.
#[allow(clippy::too_many_arguments)]
pub async fn assemble_mode_b(
    media: &MediaTool,
    video: &Path,
    cues: &[Cue],
    synths: &[SynthesizedCue],
    gap_threshold_ms: u32,
    sample_rate: u32,
    work: &Path,
) -> Result<ModeBOutput> {
    if cues.len() != synths.len() {
        return Err(Error::Invariant(format!(
            "assembly input mismatch: {} cues, {} syntheses",
            cues.len(),
            synths.len()
        )));
    }

    let gaps = detect_gaps(cues, gap_threshold_ms);
    let gap_after: std::collections::HashMap<usize, &Gap> =
        gaps.iter().map(|g| (g.prev_idx, g)).collect();
    tracing::info!(gaps = gaps.len(), threshold_ms = gap_threshold_ms, "detected timeline gaps");

    let stretcher = VideoStretcher::new(media.clone(), work);
    let mut video_segments: Vec<PathBuf> = Vec::new();
    let mut audio_segments: Vec<PathBuf> = Vec::new();
    let mut timeline: Vec<Cue> = Vec::with_capacity(cues.len());
    let mut diagnostics = SyncDiagnostics::default();
    let mut silence_seq = 0usize;
    let mut current_ms: u64 = 0;

    for (idx, (cue, synth)) in cues.iter().zip(synths).enumerate() {
        let original_ms = u64::from(cue.duration_ms());
        // Blank cues and silence substitutions keep their original slot.
        let voiced = synth.path.is_some();
        let tts_ms = if voiced { synth.duration_ms } else { original_ms };

        let role = if voiced {
            SegmentRole::Speech
        } else {
            SegmentRole::Blank
        };
        let clip = stretcher.cue_clip(video, cue, idx, tts_ms).await?;
        if let Some(warning) = clip.warning {
            diagnostics.warnings.push(warning);
        }
        video_segments.push(clip.path);

        match &synth.path {
            Some(path) => audio_segments.push(path.clone()),
            None => {
                let silence = work.join(format!("bsilence_{silence_seq:04}.wav"));
                silence_seq += 1;
                AudioClip::silence(original_ms, sample_rate)
                    .write(&silence)
                    .map_err(Error::from)?;
                audio_segments.push(silence);
            }
        }

        timeline.push(Cue::new(
            current_ms as u32,
            (current_ms + tts_ms) as u32,
            cue.text.clone(),
        ));
        diagnostics.segments.push(SegmentInfo {
            cue_idx: idx,
            original_start_ms: cue.start_ms,
            original_end_ms: cue.end_ms,
            original_ms: cue.duration_ms(),
            tts_ms,
            new_start_ms: current_ms,
            new_end_ms: current_ms + tts_ms,
            stretch_ratio: if voiced { clip.ratio } else { 1.0 },
            role,
        });
        current_ms += tts_ms;

        if let Some(gap) = gap_after.get(&idx) {
            let gap_ms = u64::from(gap.duration_ms);
            video_segments.push(stretcher.gap_clip(video, gap).await?);
            let silence = work.join(format!("bsilence_{silence_seq:04}.wav"));
            silence_seq += 1;
            AudioClip::silence(gap_ms, sample_rate)
                .write(&silence)
                .map_err(Error::from)?;
            audio_segments.push(silence);
            diagnostics.segments.push(SegmentInfo {
                cue_idx: idx,
                original_start_ms: gap.start_ms,
                original_end_ms: gap.end_ms,
                original_ms: gap.duration_ms,
                tts_ms: gap_ms,
                new_start_ms: current_ms,
                new_end_ms: current_ms + gap_ms,
                stretch_ratio: 1.0,
                role: SegmentRole::Gap,
            });
            current_ms += gap_ms;
        }
    }

    let out_video = work.join("assembled.mp4");
    media.concat_videos(&video_segments, &out_video).await?;
    let out_audio = work.join("assembled.wav");
    media.concat_audio(&audio_segments, &out_audio).await?;

    diagnostics.total_original_ms = cues.last().map(|c| u64::from(c.end_ms)).unwrap_or(0);
    diagnostics.total_new_ms = current_ms;
    diagnostics.overall_ratio =
        current_ms as f64 / diagnostics.total_original_ms.max(1) as f64;

    let audio_ms = wav_duration_ms(&out_audio).map_err(Error::from)?;
    let video_ms = media.media_duration_ms(&out_video).await?;
    let divergence = audio_ms.abs_diff(video_ms);
    tracing::info!(
        audio_ms,
        video_ms,
        divergence_ms = divergence,
        overall_ratio = diagnostics.overall_ratio,
        "mode B tracks assembled"
    );
    if divergence > LENGTH_TOLERANCE_MS {
        return Err(Error::Integrity(format!(
            "audio/video length divergence {divergence}ms exceeds {LENGTH_TOLERANCE_MS}ms"
        )));
    }

    Ok(ModeBOutput {
        video: out_video,
        audio: out_audio,
        timeline,
        diagnostics,
    })
}

/// Pure form of the Mode B timeline arithmetic, used by the subtitle
/// writer and exercised without any media tools.
pub fn mode_b_timeline(cues: &[Cue], tts_durations_ms: &[u64], gaps: &[Gap]) -> Vec<Cue> {
    let gap_after: std::collections::HashMap<usize, &Gap> =
        gaps.iter().map(|g| (g.prev_idx, g)).collect();
    let mut out = Vec::with_capacity(cues.len());
    let mut current_ms: u64 = 0;
    for (idx, cue) in cues.iter().enumerate() {
        let tts_ms = tts_durations_ms
            .get(idx)
            .copied()
            .unwrap_or(u64::from(cue.duration_ms()));
        out.push(Cue::new(
            current_ms as u32,
            (current_ms + tts_ms) as u32,
            cue.text.clone(),
        ));
        current_ms += tts_ms;
        if let Some(gap) = gap_after.get(&idx) {
            current_ms += u64::from(gap.duration_ms);
        }
    }
    out
}
