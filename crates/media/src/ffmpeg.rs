//! ffmpeg/ffprobe subprocess wrapper.
//!
//! One process per operation, stdout/stderr captured and discarded unless
//! the process fails, in which case the stderr tail lands in the error.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::{MediaError, Result};

/// Handle to the external media tools. Cheap to clone; every operation
/// spawns a fresh process.
#[derive(Debug, Clone)]
pub struct MediaTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    rubberband: PathBuf,
}

impl Default for MediaTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTool {
    pub fn new() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            rubberband: PathBuf::from("rubberband"),
        }
    }

    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            rubberband: PathBuf::from("rubberband"),
        }
    }

    /// Extract the video frames covering `[start_ms, end_ms)` of `src`
    /// into `dst`, re-encoded without audio.
    pub async fn extract_segment(
        &self,
        src: &Path,
        start_ms: u64,
        end_ms: u64,
        dst: &Path,
    ) -> Result<()> {
        let start_sec = start_ms as f64 / 1000.0;
        let duration_sec = end_ms.saturating_sub(start_ms) as f64 / 1000.0;
        self.run_ffmpeg(
            &[
                "-y",
                "-ss",
                &format!("{start_sec:.3}"),
                "-i",
                &path_arg(src),
                "-t",
                &format!("{duration_sec:.3}"),
                "-c:v",
                "libx264",
                "-preset",
                "fast",
                "-crf",
                "18",
                "-an",
                &path_arg(dst),
            ],
            "extract_segment",
        )
        .await
    }

    /// Re-time a clip by multiplying per-frame presentation time by
    /// `ratio` (> 1 slows down, < 1 speeds up).
    pub async fn retime_video(&self, src: &Path, ratio: f64, dst: &Path) -> Result<()> {
        if ratio <= 0.0 {
            return Err(MediaError::Tool {
                tool: "ffmpeg".into(),
                context: "retime_video".into(),
                detail: format!("non-positive ratio {ratio}"),
            });
        }
        self.run_ffmpeg(
            &[
                "-y",
                "-i",
                &path_arg(src),
                "-filter:v",
                &format!("setpts={ratio:.6}*PTS"),
                "-c:v",
                "libx264",
                "-preset",
                "fast",
                "-crf",
                "18",
                "-an",
                &path_arg(dst),
            ],
            "retime_video",
        )
        .await
    }

    /// Concatenate video clips with the concat demuxer (stream copy).
    pub async fn concat_videos(&self, segments: &[PathBuf], dst: &Path) -> Result<()> {
        if segments.is_empty() {
            return Err(MediaError::Tool {
                tool: "ffmpeg".into(),
                context: "concat_videos".into(),
                detail: "no segments".into(),
            });
        }
        let mut list = String::new();
        for segment in segments {
            let escaped = path_arg(segment).replace('\'', "'\\''");
            list.push_str(&format!("file '{escaped}'\n"));
        }
        let list_file = tempfile::Builder::new().suffix(".txt").tempfile()?;
        tokio::fs::write(list_file.path(), list).await?;
        self.run_ffmpeg(
            &[
                "-y",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                &path_arg(list_file.path()),
                "-c",
                "copy",
                &path_arg(dst),
            ],
            "concat_videos",
        )
        .await
    }

    /// Concatenate WAV clips through the concat filter.
    pub async fn concat_audio(&self, clips: &[PathBuf], dst: &Path) -> Result<()> {
        if clips.is_empty() {
            return Err(MediaError::Tool {
                tool: "ffmpeg".into(),
                context: "concat_audio".into(),
                detail: "no clips".into(),
            });
        }
        let mut args: Vec<String> = vec!["-y".into()];
        for clip in clips {
            args.push("-i".into());
            args.push(path_arg(clip));
        }
        let filter = (0..clips.len())
            .map(|i| format!("[{i}:a]"))
            .collect::<String>()
            + &format!("concat=n={}:v=0:a=1[out]", clips.len());
        args.extend([
            "-filter_complex".into(),
            filter,
            "-map".into(),
            "[out]".into(),
            path_arg(dst),
        ]);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_ffmpeg(&arg_refs, "concat_audio").await
    }

    /// Mux the output container: copied video, AAC audio, optional
    /// mov_text subtitle stream with a language tag, fast-start layout.
    pub async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        subtitle: Option<(&Path, &str)>,
        robust_ts: bool,
        dst: &Path,
    ) -> Result<()> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-i".into(),
            path_arg(video),
            "-i".into(),
            path_arg(audio),
        ];
        if let Some((sub_path, _)) = subtitle {
            args.push("-i".into());
            args.push(path_arg(sub_path));
        }
        args.extend(["-map".into(), "0:v:0".into(), "-map".into(), "1:a:0".into()]);
        if let Some((_, lang)) = subtitle {
            args.extend([
                "-map".into(),
                "2:0".into(),
                "-c:s".into(),
                "mov_text".into(),
                "-metadata:s:s:0".into(),
                format!("language={lang}"),
            ]);
        }
        args.extend([
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-movflags".into(),
            "+faststart".into(),
        ]);
        if robust_ts {
            args.extend([
                "-fflags".into(),
                "+genpts".into(),
                "-avoid_negative_ts".into(),
                "make_zero".into(),
                "-muxpreload".into(),
                "0".into(),
                "-muxdelay".into(),
                "0".into(),
            ]);
        }
        args.push(path_arg(dst));
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_ffmpeg(&arg_refs, "mux").await
    }

    /// Container duration in milliseconds.
    pub async fn media_duration_ms(&self, path: &Path) -> Result<u64> {
        let out = self
            .probe(path, &["-show_entries", "format=duration"])
            .await?;
        out.trim()
            .parse::<f64>()
            .map(|sec| (sec * 1000.0).round() as u64)
            .map_err(|e| MediaError::Probe {
                path: path.display().to_string(),
                detail: format!("bad duration {out:?}: {e}"),
            })
    }

    /// True when the container's start time is negative; such sources
    /// need the robust-timestamp mux flags.
    pub async fn has_negative_start(&self, path: &Path) -> Result<bool> {
        let out = self
            .probe(path, &["-show_entries", "format=start_time"])
            .await?;
        Ok(out.trim().parse::<f64>().map(|v| v < 0.0).unwrap_or(false))
    }

    /// Extract the first audio track as WAV.
    pub async fn extract_audio_track(
        &self,
        video: &Path,
        dst: &Path,
        sample_rate: u32,
        mono: bool,
    ) -> Result<()> {
        self.run_ffmpeg(
            &[
                "-y",
                "-i",
                &path_arg(video),
                "-map",
                "0:a:0",
                "-vn",
                "-ac",
                if mono { "1" } else { "2" },
                "-ar",
                &sample_rate.to_string(),
                &path_arg(dst),
            ],
            "extract_audio_track",
        )
        .await
    }

    /// Decode any audio container to mono WAV at `sample_rate`.
    pub async fn decode_to_wav(&self, src: &Path, dst: &Path, sample_rate: u32) -> Result<()> {
        self.run_ffmpeg(
            &[
                "-y",
                "-i",
                &path_arg(src),
                "-ar",
                &sample_rate.to_string(),
                "-ac",
                "1",
                &path_arg(dst),
            ],
            "decode_to_wav",
        )
        .await
    }

    /// Tempo-stretch audio with an atempo chain. `tempo > 1` shortens the
    /// clip (plays faster).
    pub async fn stretch_audio_atempo(&self, src: &Path, dst: &Path, tempo: f64) -> Result<()> {
        self.run_ffmpeg(
            &[
                "-y",
                "-i",
                &path_arg(src),
                "-filter:a",
                &atempo_chain(tempo),
                &path_arg(dst),
            ],
            "stretch_audio_atempo",
        )
        .await
    }

    /// Phase-preserving time stretch with the rubberband binary.
    /// `time_ratio` is the output/input duration factor. Errors with
    /// `Io(NotFound)` when rubberband is not installed; callers fall back
    /// to the atempo chain.
    pub async fn stretch_audio_rubberband(
        &self,
        src: &Path,
        dst: &Path,
        time_ratio: f64,
    ) -> Result<()> {
        let output = Command::new(&self.rubberband)
            .args([
                "--time",
                &format!("{time_ratio:.6}"),
                &path_arg(src),
                &path_arg(dst),
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            return Err(MediaError::Tool {
                tool: "rubberband".into(),
                context: "stretch_audio_rubberband".into(),
                detail: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }

    /// Strip leading and trailing silence below -50 dB.
    pub async fn remove_edge_silence(&self, src: &Path, dst: &Path) -> Result<()> {
        self.run_ffmpeg(
            &[
                "-y",
                "-i",
                &path_arg(src),
                "-af",
                "silenceremove=start_periods=1:start_duration=0.15:start_threshold=-50dB:\
                 stop_periods=1:stop_duration=0.15:stop_threshold=-50dB",
                &path_arg(dst),
            ],
            "remove_edge_silence",
        )
        .await
    }

    async fn run_ffmpeg(&self, args: &[&str], context: &str) -> Result<()> {
        tracing::debug!(context, args = ?args, "spawning ffmpeg");
        let output = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            return Err(MediaError::Tool {
                tool: "ffmpeg".into(),
                context: context.into(),
                detail: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }

    async fn probe(&self, path: &Path, entries: &[&str]) -> Result<String> {
        let mut args = vec!["-v", "error"];
        args.extend_from_slice(entries);
        args.extend_from_slice(&["-of", "default=noprint_wrappers=1:nokey=1"]);
        let path_s = path_arg(path);
        args.push(&path_s);
        let output = Command::new(&self.ffprobe)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            return Err(MediaError::Probe {
                path: path.display().to_string(),
                detail: stderr_tail(&output.stderr),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Build an atempo filter chain for an arbitrary tempo factor. Single
/// atempo stages only accept `[0.5, 2.0]`; factors outside compose.
pub fn atempo_chain(tempo: f64) -> String {
    let mut chain = Vec::new();
    let mut r = tempo;
    while r > 2.0 {
        chain.push("atempo=2.0".to_string());
        r /= 2.0;
    }
    while r < 0.5 {
        chain.push("atempo=0.5".to_string());
        r *= 2.0;
    }
    chain.push(format!("atempo={r:.6}"));
    chain.join(",")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    match trimmed.char_indices().rev().nth(400) {
        Some((idx, _)) => format!("...{}", &trimmed[idx..]),
        None => trimmed.to_string(),
    }
}
