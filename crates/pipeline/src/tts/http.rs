//! HTTP synthesis backend.
//!
//! POSTs `{text, speaker}` to `<server_url>/tts` and decodes whatever
//! encoded audio comes back into mono WAV at the requested rate. 4xx
//! replies are content errors (the text itself is the problem); 5xx and
//! connection failures are transport errors and get retried by the
//! orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use redub_core::{TtsBackend, TtsError};
use redub_media::MediaTool;

/// Character threshold above which the service is known to degrade.
const SERVICE_CHAR_LIMIT: usize = 75;

pub struct HttpTts {
    client: reqwest::Client,
    server_url: String,
    media: MediaTool,
}

impl HttpTts {
    pub fn new(server_url: String, timeout: Duration, media: MediaTool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            server_url,
            media,
        }
    }
}

#[async_trait]
impl TtsBackend for HttpTts {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        sample_rate_hz: u32,
    ) -> Result<PathBuf, TtsError> {
        let url = format!("{}/tts", self.server_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&json!({ "text": text, "speaker": voice_id }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TtsError::Transport(format!("tts service timeout: {url}"))
                } else {
                    TtsError::Transport(format!("tts service unreachable: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("tts service returned {status}: {}", body.trim());
            return if status.is_client_error() {
                Err(TtsError::Content(detail))
            } else {
                Err(TtsError::Transport(detail))
            };
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::Transport(format!("tts body read failed: {e}")))?;

        let encoded = tempfile::Builder::new()
            .prefix("redub_tts_")
            .suffix(".bin")
            .tempfile()
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(&bytes)?;
                Ok(f)
            })
            .map_err(|e| TtsError::Transport(format!("cannot spool tts reply: {e}")))?;

        let wav = tempfile::Builder::new()
            .prefix("redub_tts_")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| TtsError::Transport(format!("cannot create wav temp: {e}")))?
            .into_temp_path();
        self.media
            .decode_to_wav(encoded.path(), &wav, sample_rate_hz)
            .await
            .map_err(|e| TtsError::Content(format!("undecodable tts reply: {e}")))?;
        wav.keep()
            .map_err(|e| TtsError::Transport(format!("cannot keep wav temp: {e}")))
    }

    fn name(&self) -> &str {
        "http"
    }

    fn max_chars(&self) -> Option<usize> {
        Some(SERVICE_CHAR_LIMIT)
    }
}
