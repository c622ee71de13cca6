//! Content-addressed TTS cache.
//!
//! Files are named `tts_<cue_idx>_<hash8>.wav` where the hash covers
//! `(text, voice_id, sample_rate)`; identical requests resolve to
//! byte-identical audio across runs. Publishes are write-temp-then-rename
//! so concurrent runs sharing a cache directory never observe partial
//! files.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use redub_core::{Error, Result};
use redub_media::wav::wav_duration_ms;
use redub_media::AudioClip;

#[derive(Debug, Clone)]
pub struct TtsCache {
    dir: PathBuf,
}

impl TtsCache {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::InvalidInput(format!("cannot create cache dir {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file path for one request.
    pub fn path_for(&self, cue_idx: usize, text: &str, voice_id: &str, sample_rate: u32) -> PathBuf {
        let hash = request_hash(text, voice_id, sample_rate);
        self.dir.join(format!("tts_{cue_idx:04}_{hash}.wav"))
    }

    /// Duration of a cached entry, or None when absent or empty.
    pub fn lookup(&self, path: &Path) -> Option<u64> {
        let meta = std::fs::metadata(path).ok()?;
        if meta.len() == 0 {
            return None;
        }
        wav_duration_ms(path).ok()
    }

    /// Atomically publish a normalised clip at `dst`.
    pub fn publish(&self, clip: &AudioClip, dst: &Path) -> Result<()> {
        let tmp = tempfile::Builder::new()
            .prefix(".tts_tmp_")
            .suffix(".wav")
            .tempfile_in(&self.dir)?;
        clip.write(tmp.path()).map_err(redub_core::Error::from)?;
        tmp.persist(dst)
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// First eight hex digits of `sha256(text ‖ voice ‖ rate)`.
fn request_hash(text: &str, voice_id: &str, sample_rate: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0x1f]);
    hasher.update(voice_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(sample_rate.to_le_bytes());
    let digest = hasher.finalize();
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_distinct() {
        let a = request_hash("hello", "voice", 48_000);
        let b = request_hash("hello", "voice", 48_000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(a, request_hash("hello!", "voice", 48_000));
        assert_ne!(a, request_hash("hello", "other", 48_000));
        assert_ne!(a, request_hash("hello", "voice", 16_000));
    }

    #[test]
    fn test_publish_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TtsCache::new(dir.path().to_path_buf()).unwrap();
        let dst = cache.path_for(7, "text", "voice", 48_000);
        assert!(cache.lookup(&dst).is_none());

        let clip = AudioClip::silence(500, 48_000);
        cache.publish(&clip, &dst).unwrap();
        assert_eq!(cache.lookup(&dst), Some(500));
        assert!(dst
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("tts_0007_"));
    }

    #[test]
    fn test_no_partial_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TtsCache::new(dir.path().to_path_buf()).unwrap();
        let dst = cache.path_for(0, "t", "v", 48_000);
        cache.publish(&AudioClip::silence(100, 48_000), &dst).unwrap();
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].starts_with(".tts_tmp_"));
    }
}
