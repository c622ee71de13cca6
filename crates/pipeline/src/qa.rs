//! QA gate: pre-flight input checks and the post-flight onset audit.

use serde::Serialize;

use redub_config::QaConfig;
use redub_core::{extract_speaker, validate_cues, Cue, Error, Mode, Result, VoiceMap};
use redub_media::{AudioClip, Envelope};

/// Pre-flight findings. `all_passed` is the conjunction of every check
/// that applies to the run.
#[derive(Debug, Clone, Serialize)]
pub struct PreflightReport {
    pub cue_count: usize,
    pub speaker_coverage: f64,
    pub missing_speaker_tags: Vec<usize>,
    pub timeline_complete: bool,
    pub first_start_ms: u32,
    pub last_end_ms: u32,
    pub chars_exceeded: Vec<usize>,
    pub duration_exceeded: Vec<usize>,
    pub tts_length_exceeded: Vec<usize>,
    pub voice_map_ok: bool,
    pub all_passed: bool,
}

/// Run every pre-flight check. The cue list must already have parsed;
/// ordering/overlap problems surface here as an error.
pub fn preflight(
    cues: &[Cue],
    video_duration_ms: Option<u64>,
    voice_map: Option<&VoiceMap>,
    cfg: &QaConfig,
    mode: Mode,
    backend_char_limit: Option<usize>,
) -> Result<PreflightReport> {
    validate_cues(cues)?;

    let mut missing_speaker_tags = Vec::new();
    for (idx, cue) in cues.iter().enumerate() {
        if extract_speaker(&cue.text).0.is_none() {
            missing_speaker_tags.push(idx);
        }
    }
    let speaker_coverage =
        (cues.len() - missing_speaker_tags.len()) as f64 / cues.len() as f64;

    let first_start_ms = cues[0].start_ms;
    let last_end_ms = cues[cues.len() - 1].end_ms;
    let timeline_complete = match video_duration_ms {
        Some(video_ms) => {
            let tolerance = u64::from(cfg.timeline_tolerance_ms);
            u64::from(first_start_ms) <= tolerance
                && video_ms.abs_diff(u64::from(last_end_ms)) <= tolerance
        }
        None => last_end_ms > first_start_ms,
    };

    let max_chars = cfg.max_chars_for(mode);
    let max_duration = cfg.max_duration_ms_for(mode);
    let mut chars_exceeded = Vec::new();
    let mut duration_exceeded = Vec::new();
    let mut tts_length_exceeded = Vec::new();
    for (idx, cue) in cues.iter().enumerate() {
        let chars = cue.text.chars().count();
        if chars > max_chars {
            chars_exceeded.push(idx);
        }
        if cue.duration_ms() > max_duration {
            duration_exceeded.push(idx);
        }
        if let Some(limit) = backend_char_limit {
            let (_, clean) = extract_speaker(&cue.text);
            if clean.chars().count() > limit {
                tts_length_exceeded.push(idx);
            }
        }
    }

    let voice_map_ok = match voice_map {
        Some(map) => map.validate().is_ok(),
        None => true,
    };

    let multi_speaker = cfg.require_speaker_tags
        || voice_map.map(|m| m.len() > 1).unwrap_or(false);
    let coverage_ok = !multi_speaker || missing_speaker_tags.is_empty();

    let all_passed = coverage_ok
        && timeline_complete
        && chars_exceeded.is_empty()
        && duration_exceeded.is_empty()
        && tts_length_exceeded.is_empty()
        && voice_map_ok;

    Ok(PreflightReport {
        cue_count: cues.len(),
        speaker_coverage,
        missing_speaker_tags,
        timeline_complete,
        first_start_ms,
        last_end_ms,
        chars_exceeded,
        duration_exceeded,
        tts_length_exceeded,
        voice_map_ok,
        all_passed,
    })
}

/// Turn a failed report into the fatal error for its first finding.
pub fn enforce(report: &PreflightReport, multi_speaker: bool) -> Result<()> {
    if !report.voice_map_ok {
        return Err(Error::Invariant("voice map missing DEFAULT entry".into()));
    }
    if multi_speaker && !report.missing_speaker_tags.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{} cues lack speaker tags in multi-speaker mode (first: {})",
            report.missing_speaker_tags.len(),
            report.missing_speaker_tags[0]
        )));
    }
    if !report.timeline_complete {
        return Err(Error::InvalidInput(format!(
            "cue timeline [{}, {}] does not cover the video",
            report.first_start_ms, report.last_end_ms
        )));
    }
    if let Some(&idx) = report.chars_exceeded.first() {
        return Err(Error::InvalidInput(format!(
            "cue {idx} exceeds the character limit"
        )));
    }
    if let Some(&idx) = report.duration_exceeded.first() {
        return Err(Error::InvalidInput(format!(
            "cue {idx} exceeds the duration limit"
        )));
    }
    if let Some(&idx) = report.tts_length_exceeded.first() {
        return Err(Error::InvalidInput(format!(
            "cue {idx} exceeds the backend character threshold"
        )));
    }
    Ok(())
}

/// One row of the post-flight onset audit.
#[derive(Debug, Clone, Serialize)]
pub struct OnsetRow {
    pub index: usize,
    pub start_ms: u64,
    pub detected_ms: u64,
    pub delta_ms: i64,
}

/// Post-flight audit result. Findings are reported, never fatal.
#[derive(Debug, Clone, Serialize)]
pub struct SyncAuditReport {
    pub rows: Vec<OnsetRow>,
    pub max_abs_delta_ms: u64,
    pub flagged: Vec<usize>,
    pub in_sync: bool,
}

/// Locate each cue's speech onset in the final mix and measure its drift
/// from the cue's visual start.
pub fn audit_mix(mix: &AudioClip, cues: &[Cue], cfg: &QaConfig) -> SyncAuditReport {
    let envelope = Envelope::from_clip(mix, cfg.envelope_win_ms);
    let mut rows = Vec::with_capacity(cues.len());
    let mut flagged = Vec::new();
    let mut max_abs: u64 = 0;

    for (index, cue) in cues.iter().enumerate() {
        let start_ms = u64::from(cue.start_ms);
        let detected_ms = envelope.detect_onset(start_ms, cfg.onset_search_ms);
        let delta_ms = detected_ms as i64 - start_ms as i64;
        let abs = delta_ms.unsigned_abs();
        if abs > u64::from(cfg.onset_pass_ms) {
            flagged.push(index);
        }
        max_abs = max_abs.max(abs);
        rows.push(OnsetRow {
            index,
            start_ms,
            detected_ms,
            delta_ms,
        });
    }

    let in_sync = flagged.is_empty();
    if !in_sync {
        tracing::warn!(
            flagged = flagged.len(),
            max_abs_delta_ms = max_abs,
            "post-flight audit found cues out of sync"
        );
    }
    SyncAuditReport {
        rows,
        max_abs_delta_ms: max_abs,
        flagged,
        in_sync,
    }
}

/// CSV rendering of the audit (`index,start_ms,detected_ms,delta_ms`).
pub fn audit_csv(report: &SyncAuditReport) -> String {
    let mut out = String::from("index,start_ms,detected_ms,delta_ms\n");
    for row in &report.rows {
        out.push_str(&format!(
            "{},{},{},{}\n",
            row.index, row.start_ms, row.detected_ms, row.delta_ms
        ));
    }
    out
}

/// Human-oriented debug log of the audit.
pub fn audit_log(report: &SyncAuditReport) -> String {
    let mut out = String::new();
    for row in &report.rows {
        out.push_str(&format!(
            "[{}] start={} detected={} delta={}\n",
            row.index, row.start_ms, row.detected_ms, row.delta_ms
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start: u32, end: u32, text: &str) -> Cue {
        Cue::new(start, end, text)
    }

    fn default_cfg() -> QaConfig {
        QaConfig::default()
    }

    #[test]
    fn test_clean_input_passes() {
        let cues = vec![cue(200, 5000, "hello"), cue(5000, 9500, "world")];
        let report = preflight(
            &cues,
            Some(10_000),
            None,
            &default_cfg(),
            Mode::ElasticAudio,
            None,
        )
        .unwrap();
        assert!(report.all_passed);
        assert!(report.timeline_complete);
        assert_eq!(report.cue_count, 2);
    }

    #[test]
    fn test_overlapping_input_rejected() {
        let cues = vec![cue(0, 2000, "a"), cue(1000, 3000, "b")];
        assert!(preflight(
            &cues,
            None,
            None,
            &default_cfg(),
            Mode::ElasticAudio,
            None
        )
        .is_err());
    }

    #[test]
    fn test_timeline_gap_at_end_flagged() {
        let cues = vec![cue(0, 2000, "a")];
        let report = preflight(
            &cues,
            Some(10_000),
            None,
            &default_cfg(),
            Mode::ElasticAudio,
            None,
        )
        .unwrap();
        assert!(!report.timeline_complete);
        assert!(!report.all_passed);
    }

    #[test]
    fn test_mode_b_limits_are_tighter() {
        let long_text = "x".repeat(150);
        let cues = vec![cue(0, 7000, &long_text)];
        let report_a = preflight(
            &cues,
            None,
            None,
            &default_cfg(),
            Mode::ElasticAudio,
            None,
        )
        .unwrap();
        assert!(report_a.chars_exceeded.is_empty());
        assert!(report_a.duration_exceeded.is_empty());

        let report_b = preflight(
            &cues,
            None,
            None,
            &default_cfg(),
            Mode::ElasticVideo,
            None,
        )
        .unwrap();
        assert_eq!(report_b.chars_exceeded, vec![0]);
        assert_eq!(report_b.duration_exceeded, vec![0]);
    }

    #[test]
    fn test_backend_threshold_uses_clean_text() {
        let cues = vec![cue(0, 3000, "[Speaker: Alice] short")];
        let report = preflight(
            &cues,
            None,
            None,
            &default_cfg(),
            Mode::ElasticAudio,
            Some(10),
        )
        .unwrap();
        // "short" is under the limit even though the tagged text is not.
        assert!(report.tts_length_exceeded.is_empty());
    }

    #[test]
    fn test_multi_speaker_requires_full_coverage() {
        let voices = VoiceMap::from_entries([
            ("DEFAULT".to_string(), "v0".to_string()),
            ("Alice".to_string(), "v1".to_string()),
        ]);
        let cues = vec![cue(0, 1000, "[Speaker: Alice] hi"), cue(1000, 2000, "untagged")];
        let report = preflight(
            &cues,
            None,
            Some(&voices),
            &default_cfg(),
            Mode::ElasticAudio,
            None,
        )
        .unwrap();
        assert!(!report.all_passed);
        assert_eq!(report.missing_speaker_tags, vec![1]);
        assert!(enforce(&report, true).is_err());
        assert!((report.speaker_coverage - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_default_voice_is_invariant() {
        let voices = VoiceMap::from_entries([("Alice".to_string(), "v1".to_string())]);
        let cues = vec![cue(0, 1000, "[Speaker: Alice] hi")];
        let report = preflight(
            &cues,
            None,
            Some(&voices),
            &default_cfg(),
            Mode::ElasticAudio,
            None,
        )
        .unwrap();
        assert!(!report.voice_map_ok);
        assert!(matches!(
            enforce(&report, false),
            Err(Error::Invariant(_))
        ));
    }

    /// A constructed mix where one cue's speech starts 250 ms late must be
    /// flagged while its neighbours pass.
    #[test]
    fn test_audit_flags_late_cue() {
        let rate = 48_000u32;
        let ms = |m: u64| (m * rate as u64 / 1000) as usize;
        let mut samples = vec![0.0f32; ms(9000)];
        // Three cues at 1s/4s/7s; the middle one starts 250 ms late.
        for (start, late) in [(1000u64, 0u64), (4000, 250), (7000, 0)] {
            for s in &mut samples[ms(start + late)..ms(start + late + 800)] {
                *s = 0.7;
            }
        }
        let mix = AudioClip::new(samples, rate);
        let cues = vec![
            cue(1000, 2000, "a"),
            cue(4000, 5000, "b"),
            cue(7000, 8000, "c"),
        ];
        let report = audit_mix(&mix, &cues, &default_cfg());
        assert!(!report.in_sync);
        assert_eq!(report.flagged, vec![1]);
        assert!(report.max_abs_delta_ms >= 200);
        let csv = audit_csv(&report);
        assert!(csv.starts_with("index,start_ms"));
        assert_eq!(csv.lines().count(), 4);
    }

    #[test]
    fn test_audit_passes_aligned_mix() {
        let rate = 48_000u32;
        let ms = |m: u64| (m * rate as u64 / 1000) as usize;
        let mut samples = vec![0.0f32; ms(5000)];
        for s in &mut samples[ms(1000)..ms(1900)] {
            *s = 0.7;
        }
        for s in &mut samples[ms(3000)..ms(3900)] {
            *s = 0.7;
        }
        let mix = AudioClip::new(samples, rate);
        let cues = vec![cue(1000, 2000, "a"), cue(3000, 4000, "b")];
        let report = audit_mix(&mix, &cues, &default_cfg());
        assert!(report.in_sync, "deltas: {:?}", report.rows);
    }
}
