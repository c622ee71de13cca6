//! TTS orchestration: bounded concurrency, retries, timeouts, caching,
//! and output normalisation.
//!
//! The orchestrator is the only stage with suspension points. Results come
//! back densely in request order regardless of completion order; dropping
//! the returned future aborts every inflight task.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use redub_config::TtsConfig;
use redub_core::{Error, Result, TtsBackend, TtsError};
use redub_media::AudioClip;

use crate::cache::TtsCache;

/// One synthesis request. For clustered runs the index is the cluster
/// index and the text is the concatenated cleaned cluster text.
#[derive(Debug, Clone)]
pub struct TtsRequest {
    pub index: usize,
    pub text: String,
    pub voice: String,
}

/// One synthesis result. Blank requests and silence substitutions carry no
/// path; their duration is decided downstream from the cue timeline.
#[derive(Debug, Clone)]
pub struct SynthesizedCue {
    pub index: usize,
    pub path: Option<PathBuf>,
    pub duration_ms: u64,
    pub cached: bool,
    pub substituted: bool,
}

pub struct Orchestrator {
    backend: Arc<dyn TtsBackend>,
    cfg: TtsConfig,
    cache: TtsCache,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn TtsBackend>, cfg: TtsConfig, cache_dir: PathBuf) -> Result<Self> {
        Ok(Self {
            backend,
            cfg,
            cache: TtsCache::new(cache_dir)?,
        })
    }

    pub fn cache(&self) -> &TtsCache {
        &self.cache
    }

    /// Synthesize every request, at most `jobs` inflight. The returned
    /// vector is dense and in request order.
    pub async fn synthesize_all(&self, requests: Vec<TtsRequest>) -> Result<Vec<SynthesizedCue>> {
        let total = requests.len();
        let mut results: Vec<Option<SynthesizedCue>> = vec![None; total];

        // Blank cues never reach the backend.
        let mut live = Vec::new();
        for (slot, request) in requests.into_iter().enumerate() {
            if request.text.trim().is_empty() {
                tracing::debug!(index = request.index, "blank cue, skipping synthesis");
                results[slot] = Some(SynthesizedCue {
                    index: request.index,
                    path: None,
                    duration_ms: 0,
                    cached: false,
                    substituted: false,
                });
            } else {
                live.push((slot, request));
            }
        }

        if let Some(limit) = self.char_limit() {
            for (_, request) in &live {
                let chars = request.text.chars().count();
                if chars > limit {
                    return Err(Error::InvalidInput(format!(
                        "request {} has {} chars, backend limit is {}",
                        request.index, chars, limit
                    )));
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.cfg.effective_jobs()));
        let mut tasks: JoinSet<(usize, Result<SynthesizedCue>)> = JoinSet::new();
        for (slot, request) in live {
            let semaphore = semaphore.clone();
            let backend = self.backend.clone();
            let cfg = self.cfg.clone();
            let cache = self.cache.clone();
            tasks.spawn(async move {
                let permit = semaphore.acquire_owned().await.ok();
                let result = synthesize_one(backend, &cfg, &cache, &request).await;
                drop(permit);
                (slot, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (slot, result) = joined
                .map_err(|e| Error::ResourceExhausted(format!("synthesis task failed: {e}")))?;
            match result {
                Ok(done) => results[slot] = Some(done),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        let mut out = Vec::with_capacity(total);
        for (slot, result) in results.into_iter().enumerate() {
            out.push(result.ok_or_else(|| {
                Error::ResourceExhausted(format!("synthesis result {slot} missing"))
            })?);
        }
        Ok(out)
    }

    fn char_limit(&self) -> Option<usize> {
        if self.cfg.skip_length_check {
            return None;
        }
        self.cfg.max_chars.or_else(|| self.backend.max_chars())
    }
}

async fn synthesize_one(
    backend: Arc<dyn TtsBackend>,
    cfg: &TtsConfig,
    cache: &TtsCache,
    request: &TtsRequest,
) -> Result<SynthesizedCue> {
    let cache_path = cache.path_for(
        request.index,
        &request.text,
        &request.voice,
        cfg.sample_rate_hz,
    );
    if let Some(duration_ms) = cache.lookup(&cache_path) {
        tracing::debug!(index = request.index, "tts cache hit");
        return Ok(SynthesizedCue {
            index: request.index,
            path: Some(cache_path),
            duration_ms,
            cached: true,
            substituted: false,
        });
    }

    let timeout = Duration::from_secs(cfg.timeout_secs);
    let mut last_error: Option<Error> = None;
    for attempt in 1..=cfg.attempts {
        let outcome =
            tokio::time::timeout(timeout, backend.synthesize(&request.text, &request.voice, cfg.sample_rate_hz))
                .await;
        match outcome {
            Ok(Ok(raw_path)) => {
                let clip = normalize(&raw_path, cfg.sample_rate_hz)?;
                let _ = std::fs::remove_file(&raw_path);
                let duration_ms = clip.duration_ms();
                cache.publish(&clip, &cache_path)?;
                return Ok(SynthesizedCue {
                    index: request.index,
                    path: Some(cache_path),
                    duration_ms,
                    cached: false,
                    substituted: false,
                });
            }
            Ok(Err(e @ TtsError::Content(_))) => {
                return Err(Error::InvalidInput(format!(
                    "cue {}: {}",
                    request.index, e
                )));
            }
            Ok(Err(TtsError::Transport(detail))) => {
                tracing::warn!(
                    index = request.index,
                    attempt,
                    attempts = cfg.attempts,
                    error = %detail,
                    "tts transport error"
                );
                last_error = Some(Error::ResourceExhausted(format!(
                    "cue {}: {} (after {} attempts)",
                    request.index, detail, attempt
                )));
            }
            Err(_) => {
                tracing::warn!(
                    index = request.index,
                    attempt,
                    timeout_secs = cfg.timeout_secs,
                    "tts request timed out"
                );
                last_error = Some(Error::ResourceExhausted(format!(
                    "cue {}: timed out after {}s (attempt {})",
                    request.index, cfg.timeout_secs, attempt
                )));
            }
        }
        if attempt < cfg.attempts {
            tokio::time::sleep(Duration::from_millis(cfg.retry_backoff_ms)).await;
        }
    }

    let error = last_error
        .unwrap_or_else(|| Error::ResourceExhausted(format!("cue {}: no attempts ran", request.index)));
    if cfg.silence_on_failure && !cfg.no_fallback {
        tracing::warn!(index = request.index, error = %error, "substituting silence for failed cue");
        return Ok(SynthesizedCue {
            index: request.index,
            path: None,
            duration_ms: 0,
            cached: false,
            substituted: true,
        });
    }
    Err(error)
}

/// Decode a backend reply and force mono PCM at the requested rate.
fn normalize(path: &std::path::Path, sample_rate: u32) -> Result<AudioClip> {
    let clip = AudioClip::read(path).map_err(Error::from)?;
    if clip.sample_rate == sample_rate {
        Ok(clip)
    } else {
        Ok(clip.resample(sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend writing a fixed-length wav after an optional number of
    /// transport failures.
    struct FakeTts {
        duration_ms: u64,
        fail_first: usize,
        calls: AtomicUsize,
        inflight: AtomicUsize,
        max_inflight: AtomicUsize,
    }

    impl FakeTts {
        fn new(duration_ms: u64, fail_first: usize) -> Self {
            Self {
                duration_ms,
                fail_first,
                calls: AtomicUsize::new(0),
                inflight: AtomicUsize::new(0),
                max_inflight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TtsBackend for FakeTts {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &str,
            sample_rate_hz: u32,
        ) -> std::result::Result<PathBuf, TtsError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_inflight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(TtsError::Transport("flaky".into()));
            }
            let path = tempfile::Builder::new()
                .suffix(".wav")
                .tempfile()
                .unwrap()
                .into_temp_path()
                .keep()
                .unwrap();
            AudioClip::silence(self.duration_ms, sample_rate_hz)
                .write(&path)
                .unwrap();
            Ok(path)
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn test_cfg(dir: &std::path::Path) -> TtsConfig {
        TtsConfig {
            jobs: 2,
            attempts: 3,
            retry_backoff_ms: 5,
            timeout_secs: 10,
            max_chars: None,
            cache_dir: Some(dir.to_path_buf()),
            ..TtsConfig::default()
        }
    }

    fn requests(n: usize) -> Vec<TtsRequest> {
        (0..n)
            .map(|i| TtsRequest {
                index: i,
                text: format!("line {i}"),
                voice: "v".into(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_results_dense_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeTts::new(300, 0));
        let orch =
            Orchestrator::new(backend.clone(), test_cfg(dir.path()), dir.path().join("cache"))
                .unwrap();
        let out = orch.synthesize_all(requests(5)).await.unwrap();
        assert_eq!(out.len(), 5);
        for (i, cue) in out.iter().enumerate() {
            assert_eq!(cue.index, i);
            assert!(cue.path.is_some());
            assert_eq!(cue.duration_ms, 300);
        }
        // Counting gate held.
        assert!(backend.max_inflight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_blank_requests_skip_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeTts::new(300, 0));
        let orch =
            Orchestrator::new(backend.clone(), test_cfg(dir.path()), dir.path().join("cache"))
                .unwrap();
        let reqs = vec![TtsRequest {
            index: 0,
            text: "   ".into(),
            voice: "v".into(),
        }];
        let out = orch.synthesize_all(reqs).await.unwrap();
        assert!(out[0].path.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_errors_retried() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeTts::new(200, 2));
        let orch =
            Orchestrator::new(backend.clone(), test_cfg(dir.path()), dir.path().join("cache"))
                .unwrap();
        let out = orch.synthesize_all(requests(1)).await.unwrap();
        assert!(out[0].path.is_some());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_fatal_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeTts::new(200, 100));
        let orch = Orchestrator::new(backend, test_cfg(dir.path()), dir.path().join("cache"))
            .unwrap();
        let err = orch.synthesize_all(requests(1)).await.unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted(_)));
    }

    #[tokio::test]
    async fn test_silence_substitution_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeTts::new(200, 100));
        let mut cfg = test_cfg(dir.path());
        cfg.silence_on_failure = true;
        let orch = Orchestrator::new(backend, cfg, dir.path().join("cache")).unwrap();
        let out = orch.synthesize_all(requests(1)).await.unwrap();
        assert!(out[0].substituted);
        assert!(out[0].path.is_none());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_backend() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let backend = Arc::new(FakeTts::new(250, 0));
        let orch =
            Orchestrator::new(backend.clone(), test_cfg(dir.path()), cache_dir.clone()).unwrap();

        let first = orch.synthesize_all(requests(1)).await.unwrap();
        assert!(!first[0].cached);
        let first_bytes = std::fs::read(first[0].path.as_ref().unwrap()).unwrap();

        let second = orch.synthesize_all(requests(1)).await.unwrap();
        assert!(second[0].cached);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        // Byte-identical across runs.
        let second_bytes = std::fs::read(second[0].path.as_ref().unwrap()).unwrap();
        assert_eq!(first_bytes, second_bytes);
    }

    #[tokio::test]
    async fn test_length_guard_rejects_long_text() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeTts::new(200, 0));
        let mut cfg = test_cfg(dir.path());
        cfg.max_chars = Some(10);
        let orch = Orchestrator::new(backend, cfg, dir.path().join("cache")).unwrap();
        let reqs = vec![TtsRequest {
            index: 0,
            text: "way more than ten characters of text".into(),
            voice: "v".into(),
        }];
        assert!(matches!(
            orch.synthesize_all(reqs).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
