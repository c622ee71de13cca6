//! redub command-line front end.

mod project;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use redub_config::{Settings, SubtitleEmbed, TtsBackendKind};
use redub_core::{subtitle, Error, Mode, Result, VoiceMap};
use redub_media::{AudioClip, MediaTool};
use redub_pipeline::{
    audit_mix, preflight, project_metrics, rebalance, recommend_mode, semantic_restructure,
    RunRequest, Runner,
};

/// Re-dub a video from a translated subtitle track.
#[derive(Parser, Debug)]
#[command(name = "redub", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dub a video from a subtitle file
    Merge {
        srt_path: PathBuf,
        video_path: PathBuf,
        /// Output container path (default: <video>.dub.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        pipeline: PipelineOpts,
    },

    /// Rebalance cue intervals toward a target reading speed
    Rebalance {
        srt_path: PathBuf,
        /// Output path (default: <name>.rebalance.srt)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 180)]
        target_cpm: u32,
        #[arg(long, default_value_t = 1000)]
        max_shift: u32,
        #[arg(long, default_value_t = 300)]
        panic_cpm: u32,
    },

    /// Print cues whose CPM falls outside a band; optionally save a CSV
    Audit {
        srt_path: PathBuf,
        #[arg(long, default_value_t = 180)]
        min_cpm: u32,
        #[arg(long, default_value_t = 220)]
        max_cpm: u32,
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Merge fragment cues into sentence-shaped cues (content stage)
    Restructure {
        srt_path: PathBuf,
        /// Output path (default: <name>.rewritten.srt)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 250)]
        max_chars: usize,
        #[arg(long, default_value_t = 15000)]
        max_duration: u32,
    },

    /// Compute project metrics and a mode recommendation
    Analyze { project_dir: PathBuf },

    /// Check the project layout and write validation.json
    Validate { project_dir: PathBuf },

    /// Run the whole pipeline for a project directory
    Project {
        project_dir: PathBuf,
        /// Output tree (default: sibling output/<project>/)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        #[command(flatten)]
        pipeline: PipelineOpts,
    },

    /// Audit speech onsets of an existing mix against a subtitle
    SyncAudit {
        video_path: PathBuf,
        srt_path: PathBuf,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 48000)]
        ar: u32,
    },

    /// Run the pre-flight checks against a subtitle
    Qa {
        srt_path: PathBuf,
        #[arg(long)]
        voice_map: Option<PathBuf>,
        #[arg(long)]
        video_duration_ms: Option<u64>,
        /// elastic-audio or elastic-video
        #[arg(long, default_value = "elastic-audio")]
        mode: String,
        /// Character threshold for length-limited TTS backends
        #[arg(long, default_value_t = 75)]
        tts_char_threshold: usize,
    },
}

/// Pipeline switches shared by `merge` and `project`.
#[derive(Args, Debug, Default)]
struct PipelineOpts {
    /// Settings file (TOML/YAML); REDUB_ env vars override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// elastic-audio (A) or elastic-video (B)
    #[arg(long)]
    mode: Option<String>,

    /// TTS backend: http or command
    #[arg(long)]
    backend: Option<String>,

    /// Voice used when no voice map applies
    #[arg(long)]
    voice: Option<String>,

    /// HTTP TTS service base URL
    #[arg(long)]
    server_url: Option<String>,

    /// Voice map JSON (speaker -> voice id, must contain DEFAULT)
    #[arg(long)]
    voice_map: Option<PathBuf>,

    /// TTS cache directory (default: tts_cache/ next to the video)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Max inflight TTS requests
    #[arg(long)]
    jobs: Option<usize>,

    /// Output sample rate
    #[arg(long)]
    ar: Option<u32>,

    #[arg(long)]
    target_cpm: Option<u32>,

    #[arg(long)]
    max_shift: Option<u32>,

    #[arg(long)]
    panic_cpm: Option<u32>,

    /// Skip the rebalancer
    #[arg(long)]
    no_rebalance: bool,

    /// Cluster consecutive cues into utterances (Mode A)
    #[arg(long)]
    clustered: bool,

    /// Snap cluster re-split points to low-energy frames
    #[arg(long)]
    smart_split: bool,

    /// Single-file synthesis, first failure aborts
    #[arg(long)]
    no_fallback: bool,

    /// Substitute silence for failed cues instead of aborting
    #[arg(long)]
    silence_on_failure: bool,

    /// Skip the backend character-length guard
    #[arg(long)]
    skip_length_check: bool,

    /// Write display/audio dual subtitles
    #[arg(long)]
    dual_srt: bool,

    /// Write sync diagnostics and the post-flight audit CSV
    #[arg(long)]
    debug_sync: bool,

    /// Force robust timestamps instead of probing the source
    #[arg(long)]
    robust_ts: bool,

    /// Subtitle stream to embed: none, original, rebalance, display
    #[arg(long)]
    embed_subtitle: Option<String>,

    /// Language tag for the embedded subtitle stream
    #[arg(long)]
    subtitle_lang: Option<String>,
}

impl PipelineOpts {
    fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(mode) = &self.mode {
            settings.mode = mode.parse::<Mode>().map_err(Error::InvalidInput)?;
        }
        if let Some(backend) = &self.backend {
            settings.tts.backend = match backend.as_str() {
                "http" => TtsBackendKind::Http,
                "command" => TtsBackendKind::Command,
                other => {
                    return Err(Error::InvalidInput(format!("unknown backend: {other}")));
                }
            };
        }
        if let Some(voice) = &self.voice {
            settings.tts.voice = voice.clone();
        }
        if let Some(url) = &self.server_url {
            settings.tts.server_url = url.clone();
        }
        if let Some(dir) = &self.cache_dir {
            settings.tts.cache_dir = Some(dir.clone());
        }
        if let Some(jobs) = self.jobs {
            settings.tts.jobs = jobs;
        }
        if let Some(ar) = self.ar {
            settings.tts.sample_rate_hz = ar;
        }
        if let Some(v) = self.target_cpm {
            settings.rebalance.target_cpm = v;
        }
        if let Some(v) = self.max_shift {
            settings.rebalance.max_shift_ms = v;
        }
        if let Some(v) = self.panic_cpm {
            settings.rebalance.panic_cpm = v;
        }
        if self.no_rebalance {
            settings.rebalance.enabled = false;
        }
        if self.clustered {
            settings.fit.clustered = true;
        }
        if self.smart_split {
            settings.fit.smart_split = true;
        }
        if self.no_fallback {
            settings.tts.no_fallback = true;
        }
        if self.silence_on_failure {
            settings.tts.silence_on_failure = true;
        }
        if self.skip_length_check {
            settings.tts.skip_length_check = true;
        }
        if self.dual_srt {
            settings.output.dual_srt = true;
        }
        if self.debug_sync {
            settings.output.debug_sync = true;
        }
        if self.robust_ts {
            settings.output.robust_timestamps = Some(true);
        }
        if let Some(embed) = &self.embed_subtitle {
            settings.output.embed_subtitle = match embed.as_str() {
                "none" => SubtitleEmbed::None,
                "original" => SubtitleEmbed::Original,
                "rebalance" => SubtitleEmbed::Rebalance,
                "display" => SubtitleEmbed::Display,
                other => {
                    return Err(Error::InvalidInput(format!(
                        "unknown embed policy: {other}"
                    )));
                }
            };
        }
        if let Some(lang) = &self.subtitle_lang {
            settings.output.subtitle_lang = lang.clone();
        }
        settings.validate().map_err(Error::from)?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("redub: error kind={} detail={}", e.kind(), e);
            std::process::exit(1);
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Merge {
            srt_path,
            video_path,
            output,
            pipeline,
        } => {
            let settings = pipeline.settings()?;
            let voice_map = match &pipeline.voice_map {
                Some(path) => Some(VoiceMap::load(path)?),
                None => None,
            };
            let output = output.unwrap_or_else(|| default_output(&video_path));
            let runner = Runner::new(settings);
            let report = runner
                .run(&RunRequest {
                    video: video_path,
                    subtitle: srt_path,
                    output: output.clone(),
                    voice_map,
                    artifacts_dir: None,
                })
                .await?;
            for warning in &report.warnings {
                tracing::warn!("{warning}");
            }
            println!("{}", output.display());
            Ok(())
        }

        Commands::Rebalance {
            srt_path,
            output,
            target_cpm,
            max_shift,
            panic_cpm,
        } => {
            let cues = subtitle::load(&srt_path)?;
            let cfg = redub_config::RebalanceConfig {
                enabled: true,
                target_cpm,
                max_shift_ms: max_shift,
                panic_cpm,
            };
            let rebalanced = rebalance(&cues, &cfg)?;
            let out = output.unwrap_or_else(|| sibling(&srt_path, "rebalance.srt"));
            subtitle::save(&out, &rebalanced)?;
            println!("{}", out.display());
            Ok(())
        }

        Commands::Audit {
            srt_path,
            min_cpm,
            max_cpm,
            save,
        } => {
            let cues = subtitle::load(&srt_path)?;
            for (index, cpm, duration, chars, start, end) in project::cpm_rows(&cues) {
                if cpm < f64::from(min_cpm) || cpm > f64::from(max_cpm) {
                    println!("{index}\t{cpm:.1}\t{duration}\t{chars}\t{start}\t{end}");
                }
            }
            if let Some(path) = save {
                std::fs::write(&path, project::cpm_csv(&cues))?;
                println!("{}", path.display());
            }
            Ok(())
        }

        Commands::Restructure {
            srt_path,
            output,
            max_chars,
            max_duration,
        } => {
            let cues = subtitle::load(&srt_path)?;
            let restructured = semantic_restructure(&cues, max_chars, max_duration);
            let out = output.unwrap_or_else(|| sibling(&srt_path, "rewritten.srt"));
            subtitle::save(&out, &restructured)?;
            println!("{}", out.display());
            Ok(())
        }

        Commands::Analyze { project_dir } => {
            let layout = project::discover(&project_dir)?;
            let cues = subtitle::load(&layout.subtitle)?;
            let media = MediaTool::new();
            let duration_ms = media.media_duration_ms(&layout.video).await?;
            let metrics = project_metrics(&cues, duration_ms, layout.voice_map.is_some());
            let recommendation = recommend_mode(&metrics);
            let payload = serde_json::json!({
                "metrics": metrics,
                "recommendation": recommendation,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .map_err(|e| Error::Invariant(e.to_string()))?
            );
            Ok(())
        }

        Commands::Validate { project_dir } => {
            let media = MediaTool::new();
            let path = project::validate(&project_dir, &media).await?;
            println!("{}", path.display());
            Ok(())
        }

        Commands::Project {
            project_dir,
            output_dir,
            pipeline,
        } => {
            let settings = pipeline.settings()?;
            let report_path =
                project::run_project(settings, &project_dir, output_dir.as_deref()).await?;
            println!("{}", report_path.display());
            Ok(())
        }

        Commands::SyncAudit {
            video_path,
            srt_path,
            output_dir,
            ar,
        } => {
            let cues = subtitle::load(&srt_path)?;
            let media = MediaTool::new();
            let work = tempfile::tempdir()?;
            let wav = work.path().join("track.wav");
            media.extract_audio_track(&video_path, &wav, ar, true).await?;
            let clip = AudioClip::read(&wav).map_err(Error::from)?;

            let report = audit_mix(&clip, &cues, &redub_config::QaConfig::default());
            let out_dir = output_dir
                .or_else(|| video_path.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from("."));
            std::fs::create_dir_all(&out_dir)?;
            let stem = video_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "audit".into());
            let csv_path = out_dir.join(format!("{stem}.sync_audit.csv"));
            std::fs::write(&csv_path, redub_pipeline::qa::audit_csv(&report))?;
            let log_path = out_dir.join(format!("{stem}.sync_debug.log"));
            std::fs::write(&log_path, redub_pipeline::qa::audit_log(&report))?;
            println!("{}", csv_path.display());
            println!("{}", log_path.display());
            Ok(())
        }

        Commands::Qa {
            srt_path,
            voice_map,
            video_duration_ms,
            mode,
            tts_char_threshold,
        } => {
            let cues = subtitle::load(&srt_path)?;
            let mode = mode.parse::<Mode>().map_err(Error::InvalidInput)?;
            let voices = match &voice_map {
                Some(path) => Some(VoiceMap::read(path)?),
                None => None,
            };
            let report = preflight(
                &cues,
                video_duration_ms,
                voices.as_ref(),
                &redub_config::QaConfig::default(),
                mode,
                Some(tts_char_threshold),
            )?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .map_err(|e| Error::Invariant(e.to_string()))?
            );
            Ok(())
        }
    }
}

fn default_output(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".into());
    video
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{stem}.dub.mp4"))
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".into());
    path.parent()
        .unwrap_or(Path::new("."))
        .join(format!("{stem}.{suffix}"))
}
