//! Mono audio clips: WAV I/O, resampling, padding, splitting.
//!
//! Clips are always mono f32 in `[-1.0, 1.0]`. Multi-channel input is
//! downmixed on read; output is 16-bit PCM.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{FftFixedIn, Resampler};

use crate::envelope::Envelope;
use crate::{MediaError, Result};

const PCM16_SCALE: f32 = 32767.0;

/// A mono audio buffer with its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// A silent clip of the given duration. Zero-length requests yield one
    /// zero sample so downstream concatenation never sees an empty file.
    pub fn silence(duration_ms: u64, sample_rate: u32) -> Self {
        let len = ((duration_ms as f64 / 1000.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; len.max(1)], sample_rate)
    }

    /// Read a WAV file, downmixing to mono. 16/24/32-bit integer and
    /// 32-bit float formats are accepted.
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, _) => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            (SampleFormat::Int, bits) => {
                let scale = (1i64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        Ok(Self::new(samples, spec.sample_rate))
    }

    /// Write as 16-bit mono PCM.
    pub fn write(&self, path: &Path) -> Result<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * PCM16_SCALE) as i16)?;
        }
        writer.finalize()?;
        Ok(())
    }

    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() as f64 / self.sample_rate as f64 * 1000.0).round() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Extend with trailing silence to exactly `target_ms`. A clip already
    /// at or past the target is returned unchanged.
    pub fn pad_to(&mut self, target_ms: u64) {
        let target_len = ((target_ms as f64 / 1000.0) * self.sample_rate as f64).round() as usize;
        if target_len > self.samples.len() {
            self.samples.resize(target_len, 0.0);
        }
    }

    /// Concatenate clips. All inputs must share one sample rate.
    pub fn concat(clips: &[AudioClip]) -> Result<AudioClip> {
        let rate = clips
            .first()
            .map(|c| c.sample_rate)
            .ok_or_else(|| MediaError::Resample("concat of zero clips".into()))?;
        let mut samples = Vec::with_capacity(clips.iter().map(|c| c.samples.len()).sum());
        for clip in clips {
            if clip.sample_rate != rate {
                return Err(MediaError::Resample(format!(
                    "concat rate mismatch: {} vs {}",
                    clip.sample_rate, rate
                )));
            }
            samples.extend_from_slice(&clip.samples);
        }
        Ok(AudioClip::new(samples, rate))
    }

    /// Split into consecutive chunks of the given durations. The last
    /// chunk absorbs the remainder; exhausted positions yield a one-sample
    /// silent chunk.
    pub fn split_by_durations(&self, durations_ms: &[u64]) -> Vec<AudioClip> {
        let mut out = Vec::with_capacity(durations_ms.len());
        let total = self.samples.len();
        let mut pos = 0usize;
        for (i, &dur) in durations_ms.iter().enumerate() {
            let mut n = ((dur as f64 / 1000.0) * self.sample_rate as f64).round() as usize;
            if i == durations_ms.len() - 1 {
                n = total.saturating_sub(pos);
            }
            let end = (pos + n).min(total);
            out.push(self.slice_or_silence(pos, end));
            pos = end;
        }
        out
    }

    /// Like [`split_by_durations`](Self::split_by_durations) but each cut
    /// point snaps to the lowest-energy envelope frame within
    /// `search_ms`, so cluster re-splits land between words.
    pub fn split_by_durations_snapped(
        &self,
        durations_ms: &[u64],
        win_ms: u32,
        search_ms: u32,
    ) -> Vec<AudioClip> {
        let env = Envelope::from_clip(self, win_ms);
        let mut out = Vec::with_capacity(durations_ms.len());
        let total = self.samples.len();
        let mut pos = 0usize;
        for (i, &dur) in durations_ms.iter().enumerate() {
            let cur_ms = (pos as f64 / self.sample_rate as f64 * 1000.0).round() as u64;
            let cut_ms = env.nearest_low_energy_ms(cur_ms + dur, search_ms);
            let mut n = ((cut_ms as f64 / 1000.0) * self.sample_rate as f64).round() as usize;
            n = n.saturating_sub(pos);
            if i == durations_ms.len() - 1 {
                n = total.saturating_sub(pos);
            }
            let end = (pos + n).min(total);
            out.push(self.slice_or_silence(pos, end));
            pos = end;
        }
        out
    }

    fn slice_or_silence(&self, start: usize, end: usize) -> AudioClip {
        if end <= start {
            AudioClip::new(vec![0.0], self.sample_rate)
        } else {
            AudioClip::new(self.samples[start..end].to_vec(), self.sample_rate)
        }
    }

    /// Resample with rubato's FFT resampler, falling back to linear
    /// interpolation for very short clips or resampler failures.
    pub fn resample(&self, target_rate: u32) -> AudioClip {
        if self.sample_rate == target_rate {
            return self.clone();
        }
        if self.samples.len() < 64 {
            return self.resample_linear(target_rate);
        }
        match self.resample_fft(target_rate) {
            Ok(clip) => clip,
            Err(e) => {
                tracing::warn!("fft resample failed, using linear fallback: {}", e);
                self.resample_linear(target_rate)
            }
        }
    }

    fn resample_fft(&self, target_rate: u32) -> Result<AudioClip> {
        let chunk_size = self.samples.len().min(1024);
        let mut resampler =
            FftFixedIn::<f64>::new(self.sample_rate as usize, target_rate as usize, chunk_size, 2, 1)
                .map_err(|e| MediaError::Resample(e.to_string()))?;

        let expected =
            (self.samples.len() as f64 * target_rate as f64 / self.sample_rate as f64).round()
                as usize;
        let mut output: Vec<f32> = Vec::with_capacity(expected);
        let mut chunk = vec![0.0f64; chunk_size];
        for input in self.samples.chunks(chunk_size) {
            chunk[..input.len()]
                .iter_mut()
                .zip(input)
                .for_each(|(dst, &src)| *dst = f64::from(src));
            chunk[input.len()..].iter_mut().for_each(|dst| *dst = 0.0);
            let frames = resampler
                .process(&[&chunk], None)
                .map_err(|e| MediaError::Resample(e.to_string()))?;
            output.extend(frames[0].iter().map(|&s| s as f32));
        }
        output.truncate(expected);
        Ok(AudioClip::new(output, target_rate))
    }

    fn resample_linear(&self, target_rate: u32) -> AudioClip {
        let ratio = target_rate as f64 / self.sample_rate as f64;
        let new_len = (self.samples.len() as f64 * ratio) as usize;
        let mut resampled = Vec::with_capacity(new_len);
        for i in 0..new_len {
            let src_idx = i as f64 / ratio;
            let floor = src_idx.floor() as usize;
            let ceil = (floor + 1).min(self.samples.len().saturating_sub(1));
            let frac = (src_idx - floor as f64) as f32;
            resampled.push(self.samples[floor] * (1.0 - frac) + self.samples[ceil] * frac);
        }
        AudioClip::new(resampled, target_rate)
    }
}

/// Duration of a WAV file without keeping the samples.
pub fn wav_duration_ms(path: &Path) -> Result<u64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let frames = reader.duration() as f64;
    Ok((frames / spec.sample_rate as f64 * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_duration() {
        let clip = AudioClip::silence(1500, 48_000);
        assert_eq!(clip.samples.len(), 72_000);
        assert_eq!(clip.duration_ms(), 1500);
        assert_eq!(AudioClip::silence(0, 48_000).samples.len(), 1);
    }

    #[test]
    fn test_pad_to_target() {
        let mut clip = AudioClip::new(vec![0.5; 48_000], 48_000); // 1s
        clip.pad_to(2000);
        assert_eq!(clip.duration_ms(), 2000);
        assert_eq!(clip.samples[48_000], 0.0);
        // Padding never truncates.
        clip.pad_to(1000);
        assert_eq!(clip.duration_ms(), 2000);
    }

    #[test]
    fn test_concat_and_rate_mismatch() {
        let a = AudioClip::new(vec![0.1; 100], 48_000);
        let b = AudioClip::new(vec![0.2; 50], 48_000);
        let joined = AudioClip::concat(&[a.clone(), b]).unwrap();
        assert_eq!(joined.samples.len(), 150);

        let c = AudioClip::new(vec![0.2; 50], 16_000);
        assert!(AudioClip::concat(&[a, c]).is_err());
    }

    #[test]
    fn test_split_by_durations_last_takes_remainder() {
        let clip = AudioClip::new(vec![0.1; 48_000], 48_000); // 1s
        let parts = clip.split_by_durations(&[250, 250, 250]);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].duration_ms(), 250);
        assert_eq!(parts[1].duration_ms(), 250);
        // Last part absorbs the remaining 500 ms.
        assert_eq!(parts[2].duration_ms(), 500);
    }

    #[test]
    fn test_split_exhausted_positions_get_silence() {
        let clip = AudioClip::new(vec![0.1; 4800], 48_000); // 100 ms
        let parts = clip.split_by_durations(&[100, 100, 100]);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].samples.len(), 1);
        assert_eq!(parts[1].samples[0], 0.0);
    }

    #[test]
    fn test_resample_halves_length() {
        let clip = AudioClip::new(vec![0.0; 4800], 48_000);
        let resampled = clip.resample(24_000);
        let len = resampled.samples.len() as i64;
        assert!((len - 2400).abs() <= 2, "len was {len}");
        assert_eq!(resampled.sample_rate, 24_000);
    }

    #[test]
    fn test_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let clip = AudioClip::new((0..4800).map(|i| (i as f32 / 4800.0) - 0.5).collect(), 48_000);
        clip.write(&path).unwrap();

        let loaded = AudioClip::read(&path).unwrap();
        assert_eq!(loaded.sample_rate, 48_000);
        assert_eq!(loaded.samples.len(), 4800);
        // 16-bit quantisation error only.
        for (a, b) in clip.samples.iter().zip(&loaded.samples) {
            assert!((a - b).abs() < 1.0 / 16_000.0);
        }
        assert_eq!(wav_duration_ms(&path).unwrap(), 100);
    }
}
