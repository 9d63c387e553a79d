//! Centred STFT spectrograms, torchaudio style.

use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use super::mel::htk_mel_banks;
use super::too_short;
use crate::error::{Result, RunnerError};

/// STFT and mel parameters shared by `MelSpectrogram` and `Spectrogram`.
#[derive(Debug, Clone, PartialEq)]
pub struct StftOptions {
    /// Sample rate of the waveform in Hz
    pub sample_rate: u32,
    /// FFT size
    pub n_fft: usize,
    /// Samples between frame starts
    pub hop_length: usize,
    /// Hann window length, centred inside `n_fft`
    pub win_length: usize,
    /// Lowest mel frequency in Hz
    pub f_min: f32,
    /// Highest mel frequency in Hz
    pub f_max: f32,
    /// Number of mel bins
    pub n_mels: usize,
}

impl Default for StftOptions {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            n_fft: 1024,
            hop_length: 320,
            win_length: 1024,
            f_min: 50.0,
            f_max: 14000.0,
            n_mels: 64,
        }
    }
}

impl StftOptions {
    pub(crate) fn validate(&self, mel: bool) -> Result<()> {
        if self.n_fft < 2 || self.hop_length == 0 {
            return Err(RunnerError::FeatureError(format!(
                "n_fft {} and hop_length {} must be positive",
                self.n_fft, self.hop_length
            )));
        }
        if self.win_length == 0 || self.win_length > self.n_fft {
            return Err(RunnerError::FeatureError(format!(
                "win_length {} must be in 1..={}",
                self.win_length, self.n_fft
            )));
        }
        if mel && (self.n_mels == 0 || self.f_min < 0.0 || self.f_max <= self.f_min) {
            return Err(RunnerError::FeatureError(format!(
                "Bad mel parameters: n_mels {} f_min {} f_max {}",
                self.n_mels, self.f_min, self.f_max
            )));
        }
        Ok(())
    }
}

/// Reflect-pad both ends by `pad` samples, excluding the edge sample.
fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| samples[i]));
    out.extend_from_slice(samples);
    out.extend((0..pad).map(|i| samples[n - 2 - i]));
    out
}

/// Periodic Hann window of `win_length`, zero padded to `n_fft`.
fn centred_hann(win_length: usize, n_fft: usize) -> Vec<f32> {
    let offset = (n_fft - win_length) / 2;
    let mut window = vec![0.0f32; n_fft];
    for i in 0..win_length {
        window[offset + i] =
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / win_length as f32).cos();
    }
    window
}

/// Compute `[frames, n_fft / 2 + 1]` power spectra.
pub fn power_spectrogram(samples: &[f32], opts: &StftOptions) -> Result<Array2<f32>> {
    let pad = opts.n_fft / 2;
    if samples.len() <= pad {
        return Err(too_short(samples.len(), pad + 1, opts.sample_rate as f32));
    }

    let padded = reflect_pad(samples, pad);
    let frames = 1 + (padded.len() - opts.n_fft) / opts.hop_length;
    let n_freqs = opts.n_fft / 2 + 1;

    let window = centred_hann(opts.win_length, opts.n_fft);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(opts.n_fft);

    let mut power = Array2::<f32>::zeros((frames, n_freqs));
    let mut buffer = vec![Complex::new(0.0f32, 0.0); opts.n_fft];

    for f in 0..frames {
        let start = f * opts.hop_length;
        let frame = &padded[start..start + opts.n_fft];
        for (slot, (s, w)) in buffer.iter_mut().zip(frame.iter().zip(&window)) {
            *slot = Complex::new(s * w, 0.0);
        }
        fft.process(&mut buffer);
        for (k, c) in buffer.iter().take(n_freqs).enumerate() {
            power[[f, k]] = c.norm_sqr();
        }
    }
    Ok(power)
}

/// Compute `[frames, n_mels]` mel power spectra.
pub fn mel_spectrogram(samples: &[f32], opts: &StftOptions) -> Result<Array2<f32>> {
    let power = power_spectrogram(samples, opts)?;
    let banks = htk_mel_banks(
        power.ncols(),
        opts.f_min,
        opts.f_max,
        opts.n_mels,
        opts.sample_rate,
    );
    Ok(power.dot(&banks))
}
