//! Pipeline mode: one engine, two elasticity axes.

use serde::{Deserialize, Serialize};

/// Which side of the timeline bends to fit the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Mode A: compress/pad audio to the fixed visual timeline.
    #[default]
    ElasticAudio,
    /// Mode B: re-time video to natural-speed speech.
    ElasticVideo,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::ElasticAudio => "elastic-audio",
            Mode::ElasticVideo => "elastic-video",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "elastic-audio" | "a" | "A" => Ok(Mode::ElasticAudio),
            "elastic-video" | "b" | "B" => Ok(Mode::ElasticVideo),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!("elastic-video".parse::<Mode>().unwrap(), Mode::ElasticVideo);
        assert_eq!("A".parse::<Mode>().unwrap(), Mode::ElasticAudio);
        assert_eq!(Mode::ElasticVideo.to_string(), "elastic-video");
        assert!("elastic-film".parse::<Mode>().is_err());
    }
}
