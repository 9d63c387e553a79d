//! Mono audio segment with resampling and loudness normalisation.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use crate::error::{Result, RunnerError};

/// Largest gain `normalize` will apply, in dB.
pub const MAX_GAIN_DB: f32 = 300.0;

/// Mono `f32` samples at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioSegment {
    /// Wrap samples recorded at `sample_rate`.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// The samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in seconds.
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// RMS loudness in dBFS. Silence is negative infinity.
    pub fn rms_db(&self) -> f32 {
        if self.samples.is_empty() {
            return f32::NEG_INFINITY;
        }
        let energy: f32 = self.samples.iter().map(|s| s * s).sum();
        let mean_square = energy / self.samples.len() as f32;
        10.0 * mean_square.log10()
    }

    /// Apply a gain in dB.
    pub fn gain_db(&mut self, gain: f32) {
        let factor = 10f32.powf(gain / 20.0);
        self.samples.iter_mut().for_each(|s| *s *= factor);
    }

    /// Scale the segment to `target_db` RMS.
    ///
    /// # Errors
    ///
    /// Returns `AudioError` when the required gain exceeds [`MAX_GAIN_DB`],
    /// which includes silent input.
    pub fn normalize(&mut self, target_db: f32) -> Result<()> {
        let gain = target_db - self.rms_db();
        if !(gain <= MAX_GAIN_DB) {
            return Err(RunnerError::AudioError(format!(
                "Unable to normalize segment to {target_db} dB: \
                 required gain exceeds {MAX_GAIN_DB} dB"
            )));
        }
        self.gain_db(gain);
        Ok(())
    }

    /// Resample to `target_rate` with a windowed-sinc resampler.
    pub fn resample(&mut self, target_rate: u32) -> Result<()> {
        if target_rate == 0 {
            return Err(RunnerError::AudioError(
                "Target sample rate must be positive".to_string(),
            ));
        }
        if target_rate == self.sample_rate || self.samples.is_empty() {
            self.sample_rate = target_rate;
            return Ok(());
        }

        debug!("Resampling {}Hz -> {}Hz", self.sample_rate, target_rate);
        let ratio = target_rate as f64 / self.sample_rate as f64;
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, self.samples.len(), 1)
            .map_err(|e| RunnerError::AudioError(format!("Failed to create resampler: {e}")))?;

        let delay = resampler.output_delay();
        let expected = (self.samples.len() as f64 * ratio).round() as usize;

        let mut output = resampler
            .process(&[&self.samples], None)
            .map_err(|e| RunnerError::AudioError(format!("Resampling failed: {e}")))?;
        // Flush the filter tail so the last `delay` samples are not lost.
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| RunnerError::AudioError(format!("Resampling failed: {e}")))?;

        let mut resampled = std::mem::take(&mut output[0]);
        resampled.extend_from_slice(&tail[0]);
        self.samples = resampled.into_iter().skip(delay).take(expected).collect();
        self.sample_rate = target_rate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sample_rate: u32, seconds: f32, amplitude: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_duration() {
        let segment = AudioSegment::new(vec![0.0; 24000], 16000);
        assert!((segment.duration() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_rms_db() {
        // constant 0.1 is -20 dBFS
        let segment = AudioSegment::new(vec![0.1; 100], 16000);
        assert!((segment.rms_db() + 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_reaches_target() {
        let mut segment = AudioSegment::new(tone(440.0, 16000, 0.5, 0.01), 16000);
        segment.normalize(-20.0).unwrap();
        assert!((segment.rms_db() + 20.0).abs() < 1e-2);
    }

    #[test]
    fn test_normalize_rejects_silence() {
        let mut segment = AudioSegment::new(vec![0.0; 1600], 16000);
        assert!(matches!(
            segment.normalize(-20.0),
            Err(RunnerError::AudioError(_))
        ));
    }

    #[test]
    fn test_resample_noop() {
        let mut segment = AudioSegment::new(vec![0.1, 0.2, 0.3], 16000);
        segment.resample(16000).unwrap();
        assert_eq!(segment.samples(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_resample_up_and_down() {
        let mut up = AudioSegment::new(tone(200.0, 8000, 1.0, 0.5), 8000);
        up.resample(16000).unwrap();
        assert_eq!(up.sample_rate(), 16000);
        assert_eq!(up.samples().len(), 16000);

        let mut down = AudioSegment::new(tone(200.0, 44100, 0.5, 0.5), 44100);
        down.resample(16000).unwrap();
        assert_eq!(down.sample_rate(), 16000);
        assert_eq!(down.samples().len(), 8000);
    }

    #[test]
    fn test_resample_preserves_loudness() {
        let mut segment = AudioSegment::new(tone(300.0, 8000, 1.0, 0.5), 8000);
        let before = segment.rms_db();
        segment.resample(16000).unwrap();
        assert!((segment.rms_db() - before).abs() < 0.5);
    }
}
