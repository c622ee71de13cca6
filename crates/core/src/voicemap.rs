//! Speaker → voice mapping loaded from `voice_map.json`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::speaker::DEFAULT_SPEAKER;

/// Total mapping from speaker name to a backend-specific voice id. A
/// well-formed map always carries a `DEFAULT` entry; [`VoiceMap::validate`]
/// enforces that at pre-flight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceMap {
    entries: BTreeMap<String, String>,
}

impl VoiceMap {
    /// Map with a single `DEFAULT` voice.
    pub fn with_default(voice: impl Into<String>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(DEFAULT_SPEAKER.to_string(), voice.into());
        Self { entries }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Load and validate from a JSON object file.
    pub fn load(path: &Path) -> Result<Self> {
        let map = Self::read(path)?;
        map.validate()?;
        Ok(map)
    }

    /// Load without the `DEFAULT` check, for callers that report on the
    /// map instead of using it.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidInput(format!("cannot read voice map {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::InvalidInput(format!("malformed voice map {}: {}", path.display(), e))
        })
    }

    /// A voice map without `DEFAULT` cannot resolve untagged cues.
    pub fn validate(&self) -> Result<()> {
        if !self.entries.contains_key(DEFAULT_SPEAKER) {
            return Err(Error::Invariant(format!(
                "voice map missing {} entry",
                DEFAULT_SPEAKER
            )));
        }
        Ok(())
    }

    pub fn get(&self, speaker: &str) -> Option<&str> {
        self.entries.get(speaker).map(String::as_str)
    }

    /// The `DEFAULT` voice. Call only after [`validate`](Self::validate);
    /// an unvalidated map falls back to an empty voice id.
    pub fn default_voice(&self) -> &str {
        self.entries
            .get(DEFAULT_SPEAKER)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn speakers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
