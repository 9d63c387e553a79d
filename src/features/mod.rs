//! Feature extraction.
//!
//! Turns a mono waveform into a `[frames, feature_dim]` matrix for the
//! classifier. Three methods are supported:
//!
//! - **Fbank**: Kaldi-compatible log mel filterbank energies
//! - **MelSpectrogram**: power mel spectrogram with centred STFT frames
//! - **Spectrogram**: linear power spectrogram with centred STFT frames
//!
//! Every method finishes with per-bin mean normalisation over time.

pub mod fbank;
pub mod mel;
pub mod spectrogram;

use ndarray::{Array2, Axis};

use crate::error::{Result, RunnerError};

pub use fbank::FbankOptions;
pub use spectrogram::StftOptions;

/// Feature method with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureMethod {
    /// Kaldi-style log mel filterbank
    Fbank(FbankOptions),
    /// Power mel spectrogram
    MelSpectrogram(StftOptions),
    /// Linear power spectrogram
    Spectrogram(StftOptions),
}

/// Extracts normalised features from audio samples.
#[derive(Debug, Clone)]
pub struct AudioFeaturizer {
    method: FeatureMethod,
}

impl AudioFeaturizer {
    /// Create a featurizer, validating the method parameters.
    pub fn new(method: FeatureMethod) -> Result<Self> {
        match &method {
            FeatureMethod::Fbank(opts) => opts.validate()?,
            FeatureMethod::MelSpectrogram(opts) => opts.validate(true)?,
            FeatureMethod::Spectrogram(opts) => opts.validate(false)?,
        }
        Ok(Self { method })
    }

    /// Width of each feature frame.
    pub fn feature_dim(&self) -> usize {
        match &self.method {
            FeatureMethod::Fbank(opts) => opts.num_mel_bins,
            FeatureMethod::MelSpectrogram(opts) => opts.n_mels,
            FeatureMethod::Spectrogram(opts) => opts.n_fft / 2 + 1,
        }
    }

    /// Extract `[frames, feature_dim]` features, mean-normalised per bin.
    pub fn extract(&self, samples: &[f32]) -> Result<Array2<f32>> {
        let mut features = match &self.method {
            FeatureMethod::Fbank(opts) => fbank::fbank(samples, opts)?,
            FeatureMethod::MelSpectrogram(opts) => spectrogram::mel_spectrogram(samples, opts)?,
            FeatureMethod::Spectrogram(opts) => spectrogram::power_spectrogram(samples, opts)?,
        };
        normalize_mean(&mut features);
        Ok(features)
    }
}

/// Subtract the mean over time from every feature bin.
pub fn normalize_mean(features: &mut Array2<f32>) {
    if let Some(mean) = features.mean_axis(Axis(0)) {
        *features -= &mean;
    }
}

/// Error for a waveform too short to form one frame.
pub(crate) fn too_short(samples: usize, frame: usize, sample_rate: f32) -> RunnerError {
    RunnerError::AudioTooShort {
        actual: samples as f32 / sample_rate,
        minimum: frame as f32 / sample_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn tone(freq: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                0.5 * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_normalize_mean() {
        let mut features = array![[1.0f32, 10.0], [3.0, 20.0], [5.0, 30.0]];
        normalize_mean(&mut features);
        assert_eq!(features, array![[-2.0f32, -10.0], [0.0, 0.0], [2.0, 10.0]]);
    }

    #[test]
    fn test_extracted_features_have_zero_mean() {
        let featurizer =
            AudioFeaturizer::new(FeatureMethod::Fbank(FbankOptions::default())).unwrap();
        let features = featurizer.extract(&tone(440.0, 16000, 1.0)).unwrap();

        assert_eq!(features.ncols(), featurizer.feature_dim());
        for mean in features.mean_axis(Axis(0)).unwrap() {
            assert!(mean.abs() < 1e-3, "bin mean {mean} not centred");
        }
    }

    #[test]
    fn test_feature_dims() {
        let fbank = AudioFeaturizer::new(FeatureMethod::Fbank(FbankOptions {
            num_mel_bins: 40,
            ..FbankOptions::default()
        }))
        .unwrap();
        assert_eq!(fbank.feature_dim(), 40);

        let mel =
            AudioFeaturizer::new(FeatureMethod::MelSpectrogram(StftOptions::default())).unwrap();
        assert_eq!(mel.feature_dim(), 64);

        let spec = AudioFeaturizer::new(FeatureMethod::Spectrogram(StftOptions {
            n_fft: 512,
            win_length: 512,
            hop_length: 256,
            ..StftOptions::default()
        }))
        .unwrap();
        assert_eq!(spec.feature_dim(), 257);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let result = AudioFeaturizer::new(FeatureMethod::Fbank(FbankOptions {
            num_mel_bins: 0,
            ..FbankOptions::default()
        }));
        assert!(matches!(result, Err(RunnerError::FeatureError(_))));
    }
}
