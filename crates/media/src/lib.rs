//! Media plumbing for the redub pipeline: WAV clips, energy envelopes, and
//! the ffmpeg/ffprobe subprocess wrapper.
//!
//! Nothing in this crate knows about cues or modes; it moves samples and
//! frames on behalf of the pipeline stages.

pub mod envelope;
pub mod ffmpeg;
pub mod wav;

pub use envelope::Envelope;
pub use ffmpeg::MediaTool;
pub use wav::AudioClip;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    /// A media tool subprocess exited non-zero. `detail` carries the tail
    /// of its stderr.
    #[error("{tool} failed during {context}: {detail}")]
    Tool {
        tool: String,
        context: String,
        detail: String,
    },

    /// ffprobe output that did not parse.
    #[error("cannot probe {path}: {detail}")]
    Probe { path: String, detail: String },

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("resample error: {0}")]
    Resample(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MediaError> for redub_core::Error {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Io(e) => redub_core::Error::Io(e),
            other => redub_core::Error::Tool(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
