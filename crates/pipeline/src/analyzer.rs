//! Project metrics and the mode-selection advisor.
//!
//! The advisor recommends, it never gates: callers remain free to pick
//! either mode.

use serde::Serialize;

use redub_core::{extract_speaker, lang::detect_language, Cue, Mode};

/// Aggregate statistics over a cue script and its video.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectMetrics {
    pub duration_ms: u64,
    pub segment_count: usize,
    pub avg_cpm: f64,
    pub max_cpm: f64,
    pub min_cpm: f64,
    /// Cues with CPM > 300.
    pub high_density_segments: usize,
    /// Cues with CPM > 900.
    pub extreme_density_segments: usize,
    pub speaker_count: usize,
    pub detected_language: String,
    pub has_voice_map: bool,
}

/// Advisory pipeline parameters attached to a recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestedParams {
    pub mode: Mode,
    pub no_rebalance: bool,
    pub clustered: bool,
    pub target_cpm: u32,
    pub max_shift_ms: u32,
    pub max_chars: Option<usize>,
    pub max_duration_ms: Option<u32>,
    pub needs_voice_map: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeRecommendation {
    pub mode: Mode,
    pub reason: String,
    pub confidence: f64,
    pub params: SuggestedParams,
    pub warnings: Vec<String>,
}

/// Compute metrics for a cue script.
pub fn project_metrics(cues: &[Cue], duration_ms: u64, has_voice_map: bool) -> ProjectMetrics {
    let cpms: Vec<f64> = cues.iter().map(Cue::cpm).collect();
    let (avg, max, min) = if cpms.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        (
            cpms.iter().sum::<f64>() / cpms.len() as f64,
            cpms.iter().cloned().fold(f64::MIN, f64::max),
            cpms.iter().cloned().fold(f64::MAX, f64::min),
        )
    };

    let mut speakers = std::collections::BTreeSet::new();
    for cue in cues {
        if let (Some(name), _) = extract_speaker(&cue.text) {
            speakers.insert(name);
        }
    }

    let texts: Vec<&str> = cues.iter().map(|c| c.text.as_str()).collect();

    ProjectMetrics {
        duration_ms,
        segment_count: cues.len(),
        avg_cpm: avg,
        max_cpm: max,
        min_cpm: min,
        high_density_segments: cpms.iter().filter(|&&c| c > 300.0).count(),
        extreme_density_segments: cpms.iter().filter(|&&c| c > 900.0).count(),
        speaker_count: speakers.len().max(1),
        detected_language: detect_language(&texts).to_string(),
        has_voice_map,
    }
}

/// Recommend a mode from aggregate CPM statistics.
pub fn recommend_mode(metrics: &ProjectMetrics) -> ModeRecommendation {
    let mut warnings = Vec::new();

    let (mode, reason, confidence, params) = if metrics.max_cpm > 300.0 {
        (
            Mode::ElasticVideo,
            format!(
                "max CPM ({:.0}) exceeds 300; natural-speed speech with video re-timing is safer",
                metrics.max_cpm
            ),
            0.9,
            SuggestedParams {
                mode: Mode::ElasticVideo,
                no_rebalance: true,
                clustered: false,
                target_cpm: 180,
                max_shift_ms: 1000,
                max_chars: Some(100),
                max_duration_ms: Some(6_000),
                needs_voice_map: metrics.speaker_count > 1,
            },
        )
    } else if metrics.avg_cpm > 250.0 {
        (
            Mode::ElasticAudio,
            format!(
                "avg CPM ({:.0}) is high but workable with a low target and wide shifts",
                metrics.avg_cpm
            ),
            0.7,
            SuggestedParams {
                mode: Mode::ElasticAudio,
                no_rebalance: false,
                clustered: true,
                target_cpm: 160,
                max_shift_ms: 3_000,
                max_chars: None,
                max_duration_ms: None,
                needs_voice_map: metrics.speaker_count > 1,
            },
        )
    } else {
        (
            Mode::ElasticAudio,
            format!("CPM in normal range (avg={:.0})", metrics.avg_cpm),
            0.95,
            SuggestedParams {
                mode: Mode::ElasticAudio,
                no_rebalance: false,
                clustered: true,
                target_cpm: 180,
                max_shift_ms: 1_000,
                max_chars: None,
                max_duration_ms: None,
                needs_voice_map: metrics.speaker_count > 1,
            },
        )
    };

    if metrics.extreme_density_segments > 0 {
        warnings.push(format!(
            "{} segments above 900 CPM; consider splitting them before dubbing",
            metrics.extreme_density_segments
        ));
    }
    if metrics.high_density_segments * 5 > metrics.segment_count {
        warnings.push("more than 20% of segments exceed 300 CPM".to_string());
    }
    if metrics.speaker_count > 1 && !metrics.has_voice_map {
        warnings.push("multiple speakers detected but no voice_map.json present".to_string());
    }

    ModeRecommendation {
        mode,
        reason,
        confidence,
        params,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_cue(start: u32, chars: usize, duration_ms: u32) -> Cue {
        Cue::new(start, start + duration_ms, "字".repeat(chars))
    }

    #[test]
    fn test_calm_script_recommends_mode_a() {
        // 10 chars over 6s = 100 cpm
        let cues: Vec<Cue> = (0..5).map(|i| dense_cue(i * 6000, 10, 6000)).collect();
        let metrics = project_metrics(&cues, 30_000, false);
        let rec = recommend_mode(&metrics);
        assert_eq!(rec.mode, Mode::ElasticAudio);
        assert!(rec.params.clustered);
        assert_eq!(rec.params.target_cpm, 180);
        assert!(rec.confidence > 0.9);
    }

    #[test]
    fn test_dense_script_recommends_mode_b() {
        // 40 chars over 2s = 1200 cpm
        let cues = vec![dense_cue(0, 40, 2000), dense_cue(2000, 5, 3000)];
        let metrics = project_metrics(&cues, 5000, false);
        let rec = recommend_mode(&metrics);
        assert_eq!(rec.mode, Mode::ElasticVideo);
        assert!(rec.params.no_rebalance);
        assert_eq!(rec.params.max_chars, Some(100));
        // 1200 cpm is also extreme density.
        assert!(!rec.warnings.is_empty());
    }

    #[test]
    fn test_speaker_count_and_voice_map_warning() {
        let cues = vec![
            Cue::new(0, 1000, "[Speaker: A] hi"),
            Cue::new(1000, 2000, "[Speaker: B] yo"),
        ];
        let metrics = project_metrics(&cues, 2000, false);
        assert_eq!(metrics.speaker_count, 2);
        let rec = recommend_mode(&metrics);
        assert!(rec
            .warnings
            .iter()
            .any(|w| w.contains("voice_map")));
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = project_metrics(&[], 0, false);
        assert_eq!(metrics.segment_count, 0);
        assert_eq!(metrics.avg_cpm, 0.0);
        assert_eq!(metrics.speaker_count, 1);
    }
}
