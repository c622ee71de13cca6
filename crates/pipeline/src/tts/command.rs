//! Local synthesiser-command backend.
//!
//! Spawns a `say`-style program: `<program> <text> -v <voice> -o <file>`,
//! then decodes the result to WAV at the requested rate. Process spawn
//! failures are transport errors; a non-zero exit means the program
//! rejected the text or voice and is not retried.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use redub_core::{TtsBackend, TtsError};
use redub_media::MediaTool;

pub struct CommandTts {
    program: String,
    media: MediaTool,
}

impl CommandTts {
    pub fn new(program: String, media: MediaTool) -> Self {
        Self { program, media }
    }
}

#[async_trait]
impl TtsBackend for CommandTts {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        sample_rate_hz: u32,
    ) -> Result<PathBuf, TtsError> {
        let raw = tempfile::Builder::new()
            .prefix("redub_say_")
            .suffix(".aiff")
            .tempfile()
            .map_err(|e| TtsError::Transport(format!("cannot create temp: {e}")))?
            .into_temp_path();

        let output = Command::new(&self.program)
            .arg(text)
            .args(["-v", voice_id, "-o"])
            .arg(raw.as_os_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TtsError::Transport(format!("{} not runnable: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TtsError::Content(format!(
                "{} rejected the request: {}",
                self.program,
                stderr.trim()
            )));
        }

        let wav = tempfile::Builder::new()
            .prefix("redub_say_")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| TtsError::Transport(format!("cannot create wav temp: {e}")))?
            .into_temp_path();
        self.media
            .decode_to_wav(&raw, &wav, sample_rate_hz)
            .await
            .map_err(|e| TtsError::Content(format!("undecodable synthesiser output: {e}")))?;
        wav.keep()
            .map_err(|e| TtsError::Transport(format!("cannot keep wav temp: {e}")))
    }

    fn name(&self) -> &str {
        "command"
    }
}
