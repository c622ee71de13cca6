//! Main settings tree.
//!
//! Every knob has a serde default so an empty config file (or none at all)
//! yields a runnable pipeline. Values load from an optional TOML/YAML file
//! and `REDUB_`-prefixed environment variables, environment winning.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use redub_core::Mode;

use crate::ConfigError;

/// Top-level settings for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Pipeline mode (elastic-audio or elastic-video).
    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub rebalance: RebalanceConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub fit: FitConfig,

    #[serde(default)]
    pub qa: QaConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Rebalancer parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Run the rebalancer at all. Mode B advice usually turns it off.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reading speed a cue should not exceed, characters per minute.
    #[serde(default = "default_target_cpm")]
    pub target_cpm: u32,

    /// Cap on how far one boundary may move, per cue per sweep.
    #[serde(default = "default_max_shift_ms")]
    pub max_shift_ms: u32,

    /// Above this CPM a cue is in panic and may borrow twice the cap.
    #[serde(default = "default_panic_cpm")]
    pub panic_cpm: u32,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_cpm: default_target_cpm(),
            max_shift_ms: default_max_shift_ms(),
            panic_cpm: default_panic_cpm(),
        }
    }
}

/// Which TTS backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TtsBackendKind {
    /// POST to a local/remote synthesis service.
    #[default]
    Http,
    /// Spawn a local synthesiser command.
    Command,
}

/// TTS orchestration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub backend: TtsBackendKind,

    /// Base URL of the HTTP synthesis service.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Program name for the command backend.
    #[serde(default = "default_tts_command")]
    pub command: String,

    /// Voice used when no voice map applies.
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Sample rate every synthesised clip is normalised to.
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,

    /// Maximum inflight requests.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Attempts per request (transport errors only).
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Backoff between attempts, milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-request timeout, seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Character threshold for length-limited backends. None defers to
    /// the backend's own limit.
    #[serde(default = "default_max_chars_guard")]
    pub max_chars: Option<usize>,

    /// Disable the character-length guard entirely.
    #[serde(default)]
    pub skip_length_check: bool,

    /// Run single-file and propagate the first failure.
    #[serde(default)]
    pub no_fallback: bool,

    /// Substitute silence for a failed cue instead of aborting. Explicit
    /// opt-in; ignored under `no_fallback`.
    #[serde(default)]
    pub silence_on_failure: bool,

    /// Cache directory override. Defaults to `tts_cache/` next to the
    /// source video.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackendKind::default(),
            server_url: default_server_url(),
            command: default_tts_command(),
            voice: default_voice(),
            sample_rate_hz: default_sample_rate(),
            jobs: default_jobs(),
            attempts: default_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            max_chars: default_max_chars_guard(),
            skip_length_check: false,
            no_fallback: false,
            silence_on_failure: false,
            cache_dir: None,
        }
    }
}

impl TtsConfig {
    /// Effective concurrency: no-fallback mode is single-file.
    pub fn effective_jobs(&self) -> usize {
        if self.no_fallback {
            1
        } else {
            self.jobs.max(1)
        }
    }
}

/// Audio fitter parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Trim leading silence from synthesised clips before fitting.
    #[serde(default = "default_true")]
    pub trim_silence: bool,

    /// Trim only cues at or below this CPM.
    #[serde(default = "default_trim_max_cpm")]
    pub trim_max_cpm: u32,

    /// Trim only cues with at least this much visual time.
    #[serde(default = "default_trim_min_target_ms")]
    pub trim_min_target_ms: u32,

    /// Cluster consecutive cues into utterances (Mode A).
    #[serde(default)]
    pub clustered: bool,

    /// Snap cluster re-split points to the nearest low-energy frame.
    #[serde(default)]
    pub smart_split: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            trim_silence: true,
            trim_max_cpm: default_trim_max_cpm(),
            trim_min_target_ms: default_trim_min_target_ms(),
            clustered: false,
            smart_split: false,
        }
    }
}

/// QA gate parameters. Character/duration limits are per mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    /// Require a speaker tag on every cue (multi-speaker runs).
    #[serde(default)]
    pub require_speaker_tags: bool,

    /// Tolerance at each end of the timeline-coverage check, ms.
    #[serde(default = "default_timeline_tolerance_ms")]
    pub timeline_tolerance_ms: u32,

    /// Gaps longer than this become explicit segments, ms.
    #[serde(default = "default_gap_threshold_ms")]
    pub gap_threshold_ms: u32,

    /// Post-flight onset search window around each cue start, ms.
    #[serde(default = "default_onset_search_ms")]
    pub onset_search_ms: u32,

    /// Pass bound on the absolute onset delta, ms.
    #[serde(default = "default_onset_pass_ms")]
    pub onset_pass_ms: u32,

    /// Energy-envelope window, ms.
    #[serde(default = "default_envelope_win_ms")]
    pub envelope_win_ms: u32,

    /// Override the per-mode character limit.
    #[serde(default)]
    pub max_chars: Option<usize>,

    /// Override the per-mode duration limit, ms.
    #[serde(default)]
    pub max_duration_ms: Option<u32>,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            require_speaker_tags: false,
            timeline_tolerance_ms: default_timeline_tolerance_ms(),
            gap_threshold_ms: default_gap_threshold_ms(),
            onset_search_ms: default_onset_search_ms(),
            onset_pass_ms: default_onset_pass_ms(),
            envelope_win_ms: default_envelope_win_ms(),
            max_chars: None,
            max_duration_ms: None,
        }
    }
}

impl QaConfig {
    /// Character limit for a mode, honouring any override.
    pub fn max_chars_for(&self, mode: Mode) -> usize {
        self.max_chars.unwrap_or(match mode {
            Mode::ElasticAudio => 250,
            Mode::ElasticVideo => 100,
        })
    }

    /// Duration limit for a mode, honouring any override.
    pub fn max_duration_ms_for(&self, mode: Mode) -> u32 {
        self.max_duration_ms.unwrap_or(match mode {
            Mode::ElasticAudio => 15_000,
            Mode::ElasticVideo => 6_000,
        })
    }
}

/// Which subtitle stream lands in the output container (Mode A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SubtitleEmbed {
    None,
    Original,
    #[default]
    Rebalance,
    Display,
}

/// Output and muxing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub embed_subtitle: SubtitleEmbed,

    /// Language tag for the embedded subtitle stream.
    #[serde(default = "default_subtitle_lang")]
    pub subtitle_lang: String,

    /// Force robust timestamps. None probes the source for negative
    /// start-time instead.
    #[serde(default)]
    pub robust_timestamps: Option<bool>,

    /// Write display/audio dual subtitles via the content-stage
    /// restructure.
    #[serde(default)]
    pub dual_srt: bool,

    /// Emit per-segment sync diagnostics and the post-flight audit CSV.
    #[serde(default)]
    pub debug_sync: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            embed_subtitle: SubtitleEmbed::default(),
            subtitle_lang: default_subtitle_lang(),
            robust_timestamps: None,
            dual_srt: false,
            debug_sync: false,
        }
    }
}

impl Settings {
    /// Load settings: defaults, then an optional file, then `REDUB_`
    /// environment variables (`REDUB_TTS__JOBS=8` style).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix("REDUB").separator("__"));
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tts.jobs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tts.jobs".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.tts.attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tts.attempts".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.tts.sample_rate_hz < 8_000 {
            return Err(ConfigError::InvalidValue {
                field: "tts.sample_rate_hz".into(),
                message: "below 8000 Hz".into(),
            });
        }
        if self.rebalance.target_cpm == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rebalance.target_cpm".into(),
                message: "must be positive".into(),
            });
        }
        if self.tts.backend == TtsBackendKind::Http && self.tts.server_url.is_empty() {
            return Err(ConfigError::MissingField("tts.server_url".into()));
        }
        if self.qa.envelope_win_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "qa.envelope_win_ms".into(),
                message: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// The subtitle embed policy auto-upgrades to the display variant when
    /// dual subtitles are generated.
    pub fn effective_embed(&self) -> SubtitleEmbed {
        if self.output.dual_srt && self.output.embed_subtitle == SubtitleEmbed::Rebalance {
            SubtitleEmbed::Display
        } else {
            self.output.embed_subtitle
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_target_cpm() -> u32 {
    180
}

fn default_max_shift_ms() -> u32 {
    1000
}

fn default_panic_cpm() -> u32 {
    300
}

fn default_server_url() -> String {
    "http://localhost:3456".to_string()
}

fn default_tts_command() -> String {
    "say".to_string()
}

fn default_voice() -> String {
    "zh-CN-YunjianNeural".to_string()
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_jobs() -> usize {
    4
}

fn default_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    800
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_max_chars_guard() -> Option<usize> {
    Some(75)
}

fn default_trim_max_cpm() -> u32 {
    260
}

fn default_trim_min_target_ms() -> u32 {
    1200
}

fn default_timeline_tolerance_ms() -> u32 {
    1000
}

fn default_gap_threshold_ms() -> u32 {
    100
}

fn default_onset_search_ms() -> u32 {
    500
}

fn default_onset_pass_ms() -> u32 {
    180
}

fn default_envelope_win_ms() -> u32 {
    20
}

fn default_subtitle_lang() -> String {
    "zh".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.rebalance.target_cpm, 180);
        assert_eq!(settings.tts.jobs, 4);
        assert_eq!(settings.tts.sample_rate_hz, 48_000);
        assert_eq!(settings.qa.gap_threshold_ms, 100);
    }

    #[test]
    fn test_no_fallback_is_single_file() {
        let mut tts = TtsConfig::default();
        tts.no_fallback = true;
        assert_eq!(tts.effective_jobs(), 1);
        tts.no_fallback = false;
        assert_eq!(tts.effective_jobs(), 4);
    }

    #[test]
    fn test_per_mode_limits() {
        let qa = QaConfig::default();
        assert_eq!(qa.max_chars_for(Mode::ElasticAudio), 250);
        assert_eq!(qa.max_chars_for(Mode::ElasticVideo), 100);
        assert_eq!(qa.max_duration_ms_for(Mode::ElasticAudio), 15_000);
        assert_eq!(qa.max_duration_ms_for(Mode::ElasticVideo), 6_000);

        let overridden = QaConfig {
            max_chars: Some(80),
            ..QaConfig::default()
        };
        assert_eq!(overridden.max_chars_for(Mode::ElasticAudio), 80);
    }

    #[test]
    fn test_embed_upgrade_with_dual_srt() {
        let mut settings = Settings::default();
        assert_eq!(settings.effective_embed(), SubtitleEmbed::Rebalance);
        settings.output.dual_srt = true;
        assert_eq!(settings.effective_embed(), SubtitleEmbed::Display);
        settings.output.embed_subtitle = SubtitleEmbed::Original;
        assert_eq!(settings.effective_embed(), SubtitleEmbed::Original);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "mode = \"elastic-video\"\n[tts]\njobs = 8").unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.mode, Mode::ElasticVideo);
        assert_eq!(settings.tts.jobs, 8);
        // Untouched sections keep their defaults.
        assert_eq!(settings.rebalance.max_shift_ms, 1000);
    }

    #[test]
    fn test_validation_rejects_zero_jobs() {
        let mut settings = Settings::default();
        settings.tts.jobs = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
