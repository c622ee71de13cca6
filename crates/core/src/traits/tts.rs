//! Text-to-speech backend interface.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Backend failure, split along the retry boundary: transport errors are
/// worth retrying, content errors (text the backend cannot speak) are not.
#[derive(Error, Debug)]
pub enum TtsError {
    #[error("tts transport error: {0}")]
    Transport(String),

    #[error("tts content error: {0}")]
    Content(String),
}

impl TtsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TtsError::Transport(_))
    }
}

/// Speech synthesis backend.
///
/// Implementations:
/// - `HttpTts` - POSTs to a synthesis service and decodes the reply
/// - `CommandTts` - spawns a local synthesiser command
///
/// The orchestrator owns concurrency, retries, timeouts, caching, and
/// output normalisation; a backend only has to produce an audio file for
/// one request.
#[async_trait]
pub trait TtsBackend: Send + Sync + 'static {
    /// Synthesize `text` with `voice_id`, returning the path of an audio
    /// file. The file need not be at `sample_rate_hz` or mono; the
    /// orchestrator normalises afterwards.
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        sample_rate_hz: u32,
    ) -> Result<PathBuf, TtsError>;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Character count above which this backend is known to degrade, if
    /// any. The orchestrator and the pre-flight gate enforce it.
    fn max_chars(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(TtsError::Transport("timeout".into()).is_retryable());
        assert!(!TtsError::Content("unsupported characters".into()).is_retryable());
    }
}
