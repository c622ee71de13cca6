//! Error taxonomy shared by every stage of the engine.
//!
//! The variants map one-to-one onto the propagation rules: input,
//! invariant, and tool errors abort a run; resource errors abort unless the
//! operator opted into silence substitution; integrity findings are
//! reported with the artefacts instead of failing the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed external input: subtitle parse failure, missing project
    /// files, malformed voice map.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A script-stage transform changed cue text. The index is the first
    /// differing position.
    #[error("cue text mutated in script stage at index {index}")]
    TextMutation { index: usize },

    /// Cue ordering or overlap constraint broken.
    #[error("cue ordering violated at index {index}: {reason}")]
    Ordering { index: usize, reason: String },

    /// Any other violated engine invariant (missing DEFAULT voice, span
    /// drift, ...).
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A backend ran out of retries, timed out, or is unreachable.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Output integrity finding: extreme stretch ratio, audio/video length
    /// divergence, onset drift. Reported, never auto-corrected.
    #[error("integrity: {0}")]
    Integrity(String),

    /// External media tool (ffmpeg/ffprobe) process failure.
    #[error("media tool failure: {0}")]
    Tool(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable kind label used in the single-line stderr diagnostic and in
    /// `report.json`.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "input",
            Error::TextMutation { .. } | Error::Ordering { .. } | Error::Invariant(_) => {
                "invariant"
            }
            Error::ResourceExhausted(_) => "resource",
            Error::Integrity(_) => "integrity",
            Error::Tool(_) => "tool",
            Error::Io(_) => "io",
        }
    }

}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(Error::TextMutation { index: 3 }.kind(), "invariant");
        assert_eq!(Error::InvalidInput("x".into()).kind(), "input");
        assert_eq!(Error::Integrity("x".into()).kind(), "integrity");
    }

    #[test]
    fn test_io_errors_carry_through() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), "io");
    }
}
