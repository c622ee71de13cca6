//! One pipeline run, start to finish.
//!
//! `Init → PreQa → Synthesis → Fit → Assemble → PostQa → Done`, with any
//! stage able to fail the run. Nothing retries across stages; the
//! orchestrator's internal retries are the only retries anywhere. A
//! post-flight audit failure is recorded in the report, not raised.

use std::path::{Path, PathBuf};

use serde::Serialize;

use redub_config::{Settings, SubtitleEmbed};
use redub_core::{
    assert_text_equal, subtitle, Cue, Error, Mode, Result, SpeakerTracker, VoiceMap,
};
use redub_media::{AudioClip, MediaTool};

use crate::analyzer::{project_metrics, recommend_mode, ModeRecommendation};
use crate::assemble::{assemble_mode_a, assemble_mode_b};
use crate::cluster::cluster_cues;
use crate::fit::Fitter;
use crate::orchestrator::{Orchestrator, SynthesizedCue, TtsRequest};
use crate::qa::{audit_csv, audit_log, audit_mix, enforce, preflight, SyncAuditReport};
use crate::rebalance::rebalance;
use crate::restructure::semantic_restructure;
use crate::tts::create_backend;

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    PreQa,
    Synthesis,
    Fit,
    Assemble,
    PostQa,
    Done,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::PreQa => "pre_qa",
            RunState::Synthesis => "synthesis",
            RunState::Fit => "fit",
            RunState::Assemble => "assemble",
            RunState::PostQa => "post_qa",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub video: PathBuf,
    pub subtitle: PathBuf,
    pub output: PathBuf,
    pub voice_map: Option<VoiceMap>,
    /// Where subtitle variants and audit files land. Defaults to the
    /// output's directory.
    pub artifacts_dir: Option<PathBuf>,
}

/// Paths produced by a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutputs {
    pub video: PathBuf,
    pub rebalance_srt: Option<PathBuf>,
    pub display_srt: Option<PathBuf>,
    pub audio_srt: Option<PathBuf>,
    pub mode_b_srt: Option<PathBuf>,
    pub sync_audit_csv: Option<PathBuf>,
}

/// Post-flight summary embedded in the report.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub audited_cues: usize,
    pub max_abs_delta_ms: u64,
    pub flagged: Vec<usize>,
    pub in_sync: bool,
}

impl From<&SyncAuditReport> for SyncSummary {
    fn from(report: &SyncAuditReport) -> Self {
        Self {
            audited_cues: report.rows.len(),
            max_abs_delta_ms: report.max_abs_delta_ms,
            flagged: report.flagged.clone(),
            in_sync: report.in_sync,
        }
    }
}

/// Final run report: inputs, parameters, synthesis counts, warnings,
/// post-flight statistics, and output paths.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input_video: PathBuf,
    pub input_subtitle: PathBuf,
    pub mode: Mode,
    pub settings: Settings,
    pub cue_count: usize,
    pub synthesized: usize,
    pub cached: usize,
    pub substituted: usize,
    pub warnings: Vec<String>,
    pub sync: Option<SyncSummary>,
    pub outputs: RunOutputs,
    pub completed_at: String,
}

pub struct Runner {
    settings: Settings,
    media: MediaTool,
}

impl Runner {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            media: MediaTool::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Advisory mode recommendation for a cue script.
    pub async fn advise(&self, video: &Path, cues: &[Cue], has_voice_map: bool) -> Result<ModeRecommendation> {
        let duration_ms = self.media.media_duration_ms(video).await?;
        Ok(recommend_mode(&project_metrics(cues, duration_ms, has_voice_map)))
    }

    /// Run the full pipeline for one video + subtitle pair.
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let settings = &self.settings;
        let mode = settings.mode;
        let mut state = RunState::Init;
        let mut warnings: Vec<String> = Vec::new();
        let mut outputs = RunOutputs {
            video: request.output.clone(),
            ..RunOutputs::default()
        };

        let work_guard = tempfile::tempdir()?;
        let work = work_guard.path();
        let artifacts = request
            .artifacts_dir
            .clone()
            .or_else(|| request.output.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&artifacts)?;
        let subtitle_stem = file_stem(&request.subtitle);
        let output_stem = file_stem(&request.output);

        // ---- PreQa ------------------------------------------------------
        state = advance(state, RunState::PreQa);
        let cues = subtitle::load(&request.subtitle)?;
        let original_texts = cues.clone();
        let video_duration_ms = self.media.media_duration_ms(&request.video).await?;

        let backend = create_backend(&settings.tts, self.media.clone());
        let backend_limit = if settings.tts.skip_length_check {
            None
        } else {
            settings.tts.max_chars.or_else(|| backend.max_chars())
        };
        let preflight_report = preflight(
            &cues,
            Some(video_duration_ms),
            request.voice_map.as_ref(),
            &settings.qa,
            mode,
            backend_limit,
        )?;
        let multi_speaker = settings.qa.require_speaker_tags
            || request.voice_map.as_ref().map(|m| m.len() > 1).unwrap_or(false);
        enforce(&preflight_report, multi_speaker)?;
        tracing::info!(
            cues = cues.len(),
            video_ms = video_duration_ms,
            coverage = preflight_report.speaker_coverage,
            "pre-flight checks passed"
        );

        // Dual subtitles are a content-stage product of the input script.
        if settings.output.dual_srt {
            let display_path = artifacts.join(format!("{subtitle_stem}.display.srt"));
            let audio_path = artifacts.join(format!("{subtitle_stem}.audio.srt"));
            subtitle::save(&display_path, &cues)?;
            let restructured = semantic_restructure(
                &cues,
                settings.qa.max_chars_for(mode),
                settings.qa.max_duration_ms_for(mode),
            );
            subtitle::save(&audio_path, &restructured)?;
            outputs.display_srt = Some(display_path);
            outputs.audio_srt = Some(audio_path);
        }

        // Rebalance relieves dense cues; clustering absorbs density on its
        // own, so a clustered Mode A run skips it.
        let clustered = mode == Mode::ElasticAudio && settings.fit.clustered;
        let script = if settings.rebalance.enabled && !clustered {
            let rebalanced = rebalance(&cues, &settings.rebalance)?;
            assert_text_equal(&original_texts, &rebalanced)?;
            let path = artifacts.join(format!("{subtitle_stem}.rebalance.srt"));
            subtitle::save(&path, &rebalanced)?;
            outputs.rebalance_srt = Some(path);
            rebalanced
        } else {
            cues
        };

        // ---- Synthesis --------------------------------------------------
        state = advance(state, RunState::Synthesis);
        let voices = request
            .voice_map
            .clone()
            .unwrap_or_else(|| VoiceMap::with_default(settings.tts.voice.clone()));
        let mut tracker = SpeakerTracker::new();
        let resolved: Vec<(String, String)> = script
            .iter()
            .map(|cue| tracker.resolve(&cue.text, &voices))
            .collect();

        let clusters: Vec<Vec<usize>> = if clustered {
            cluster_cues(&script)
        } else {
            (0..script.len()).map(|i| vec![i]).collect()
        };
        let requests: Vec<TtsRequest> = clusters
            .iter()
            .enumerate()
            .map(|(cluster_idx, members)| {
                let text = members
                    .iter()
                    .map(|&i| resolved[i].1.trim())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                TtsRequest {
                    index: cluster_idx,
                    text,
                    voice: resolved[members[0]].0.clone(),
                }
            })
            .collect();

        let cache_dir = settings.tts.cache_dir.clone().unwrap_or_else(|| {
            request
                .video
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("tts_cache")
        });
        let orchestrator = Orchestrator::new(backend, settings.tts.clone(), cache_dir)?;
        let synths = orchestrator.synthesize_all(requests).await?;
        let synthesized = synths.iter().filter(|s| s.path.is_some() && !s.cached).count();
        let cached = synths.iter().filter(|s| s.cached).count();
        let substituted = synths.iter().filter(|s| s.substituted).count();
        if substituted > 0 {
            warnings.push(format!("{substituted} cues substituted with silence"));
        }
        tracing::info!(synthesized, cached, substituted, "synthesis complete");

        // ---- Fit + Assemble + PostQa, split by mode ---------------------
        let (mix_for_audit, audit_timeline) = match mode {
            Mode::ElasticAudio => {
                state = advance(state, RunState::Fit);
                let fitter = Fitter::new(
                    self.media.clone(),
                    settings.fit.clone(),
                    settings.tts.sample_rate_hz,
                    work,
                );
                let mut fitted: Vec<Option<PathBuf>> = vec![None; script.len()];
                for (cluster_idx, members) in clusters.iter().enumerate() {
                    let synth = &synths[cluster_idx];
                    if members.len() == 1 {
                        let idx = members[0];
                        fitted[idx] =
                            Some(fitter.fit_cue(&script[idx], synth, idx).await?);
                    } else {
                        for (idx, path) in
                            fitter.fit_cluster(&script, members, synth, cluster_idx).await?
                        {
                            fitted[idx] = Some(path);
                        }
                    }
                }
                let fitted: Vec<PathBuf> = fitted
                    .into_iter()
                    .enumerate()
                    .map(|(i, p)| {
                        p.ok_or_else(|| Error::Invariant(format!("cue {i} was never fitted")))
                    })
                    .collect::<Result<_>>()?;

                state = advance(state, RunState::Assemble);
                let mix = assemble_mode_a(
                    &self.media,
                    &script,
                    &fitted,
                    video_duration_ms,
                    settings.tts.sample_rate_hz,
                    work,
                )
                .await?;
                let embed = self.embed_path(&outputs, request);
                let robust = match settings.output.robust_timestamps {
                    Some(forced) => forced,
                    None => self
                        .media
                        .has_negative_start(&request.video)
                        .await
                        .unwrap_or(false),
                };
                self.media
                    .mux(
                        &request.video,
                        &mix,
                        embed.as_deref().map(|p| (p, settings.output.subtitle_lang.as_str())),
                        robust,
                        &request.output,
                    )
                    .await?;
                (mix, script.clone())
            }
            Mode::ElasticVideo => {
                // Natural-speed audio: the fitter never compresses here.
                state = advance(state, RunState::Fit);
                let per_cue = flatten_to_cues(&clusters, &synths, script.len())?;

                state = advance(state, RunState::Assemble);
                let assembly = assemble_mode_b(
                    &self.media,
                    &request.video,
                    &script,
                    &per_cue,
                    settings.qa.gap_threshold_ms,
                    settings.tts.sample_rate_hz,
                    work,
                )
                .await?;
                warnings.extend(assembly.diagnostics.warnings.clone());
                assert_text_equal(&script, &assembly.timeline)?;

                let mode_b_path = artifacts.join(format!("{subtitle_stem}.mode_b.srt"));
                subtitle::save(&mode_b_path, &assembly.timeline)?;
                outputs.mode_b_srt = Some(mode_b_path.clone());

                let embed = match self.settings.effective_embed() {
                    SubtitleEmbed::None => None,
                    SubtitleEmbed::Display => outputs.display_srt.clone(),
                    _ => Some(mode_b_path),
                };
                let robust = match settings.output.robust_timestamps {
                    Some(forced) => forced,
                    None => self
                        .media
                        .has_negative_start(&assembly.video)
                        .await
                        .unwrap_or(false),
                };
                self.media
                    .mux(
                        &assembly.video,
                        &assembly.audio,
                        embed.as_deref().map(|p| (p, settings.output.subtitle_lang.as_str())),
                        robust,
                        &request.output,
                    )
                    .await?;
                if settings.output.debug_sync {
                    let diag_path = artifacts.join(format!("{output_stem}.sync_diag.json"));
                    std::fs::write(
                        &diag_path,
                        serde_json::to_string_pretty(&assembly.diagnostics)
                            .map_err(|e| Error::Invariant(e.to_string()))?,
                    )?;
                }
                (assembly.audio, assembly.timeline)
            }
        };

        // ---- PostQa -----------------------------------------------------
        state = advance(state, RunState::PostQa);
        let mix_clip = AudioClip::read(&mix_for_audit).map_err(Error::from)?;
        let audit = audit_mix(&mix_clip, &audit_timeline, &settings.qa);
        if !audit.in_sync {
            warnings.push(format!(
                "post-flight audit: {} cues out of sync (max |delta| {}ms)",
                audit.flagged.len(),
                audit.max_abs_delta_ms
            ));
        }
        if settings.output.debug_sync {
            let csv_path = artifacts.join(format!("{output_stem}.sync_audit.csv"));
            std::fs::write(&csv_path, audit_csv(&audit))?;
            let log_path = artifacts.join(format!("{output_stem}.sync_debug.log"));
            std::fs::write(&log_path, audit_log(&audit))?;
            outputs.sync_audit_csv = Some(csv_path);
        }

        advance(state, RunState::Done);

        Ok(RunReport {
            input_video: request.video.clone(),
            input_subtitle: request.subtitle.clone(),
            mode,
            settings: settings.clone(),
            cue_count: original_texts.len(),
            synthesized,
            cached,
            substituted,
            warnings,
            sync: Some(SyncSummary::from(&audit)),
            outputs,
            completed_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Which subtitle file the Mode A mux embeds.
    fn embed_path(&self, outputs: &RunOutputs, request: &RunRequest) -> Option<PathBuf> {
        match self.settings.effective_embed() {
            SubtitleEmbed::None => None,
            SubtitleEmbed::Original => Some(request.subtitle.clone()),
            SubtitleEmbed::Rebalance => outputs.rebalance_srt.clone(),
            SubtitleEmbed::Display => outputs.display_srt.clone(),
        }
    }
}

/// Map per-cluster synthesis results back to per-cue results. Mode B runs
/// per-cue requests, so this is usually the identity; it exists so a
/// clustered script handed to Mode B still behaves.
fn flatten_to_cues(
    clusters: &[Vec<usize>],
    synths: &[SynthesizedCue],
    cue_count: usize,
) -> Result<Vec<SynthesizedCue>> {
    let mut out: Vec<Option<SynthesizedCue>> = vec![None; cue_count];
    for (cluster_idx, members) in clusters.iter().enumerate() {
        let synth = &synths[cluster_idx];
        if members.len() == 1 {
            out[members[0]] = Some(synth.clone());
        } else {
            // Mode B pairs each cue's video with its own natural-speed
            // clip; a multi-cue synthesis has no per-cue durations to
            // offer.
            return Err(Error::Invariant(
                "clustered synthesis cannot drive elastic-video assembly".into(),
            ));
        }
    }
    out.into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| Error::Invariant(format!("cue {i} missing synthesis"))))
        .collect()
}

fn advance(from: RunState, to: RunState) -> RunState {
    tracing::info!(from = %from, to = %to, "pipeline stage");
    to
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_names() {
        assert_eq!(RunState::PreQa.to_string(), "pre_qa");
        assert_eq!(RunState::Done.to_string(), "done");
    }

    #[test]
    fn test_flatten_identity_for_singletons() {
        let clusters = vec![vec![0], vec![1]];
        let synths = vec![
            SynthesizedCue {
                index: 0,
                path: None,
                duration_ms: 0,
                cached: false,
                substituted: false,
            },
            SynthesizedCue {
                index: 1,
                path: Some(PathBuf::from("x.wav")),
                duration_ms: 500,
                cached: true,
                substituted: false,
            },
        ];
        let out = flatten_to_cues(&clusters, &synths, 2).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].duration_ms, 500);
    }

    #[test]
    fn test_flatten_rejects_real_clusters() {
        let clusters = vec![vec![0, 1]];
        let synths = vec![SynthesizedCue {
            index: 0,
            path: None,
            duration_ms: 0,
            cached: false,
            substituted: false,
        }];
        assert!(flatten_to_cues(&clusters, &synths, 2).is_err());
    }
}
