//! Kaldi-compatible log mel filterbank.
//!
//! Matches `compute-fbank-feats` with dithering disabled: `snip_edges`
//! framing, DC offset removal, pre-emphasis, Povey window, zero padding to a
//! power of two, power spectrum, mel projection and natural log floored at
//! machine epsilon.

use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use super::mel::kaldi_mel_banks;
use super::too_short;
use crate::error::{Result, RunnerError};

/// Filterbank parameters, named after their Kaldi options.
#[derive(Debug, Clone, PartialEq)]
pub struct FbankOptions {
    /// Sample rate of the waveform in Hz
    pub sample_frequency: f32,
    /// Frame length in milliseconds
    pub frame_length_ms: f32,
    /// Frame shift in milliseconds
    pub frame_shift_ms: f32,
    /// Number of triangular mel bins
    pub num_mel_bins: usize,
    /// Low cutoff of the mel bins in Hz
    pub low_freq: f32,
    /// High cutoff in Hz; zero or negative is an offset from Nyquist
    pub high_freq: f32,
    /// Pre-emphasis coefficient
    pub preemphasis: f32,
    /// Subtract the frame mean before windowing
    pub remove_dc_offset: bool,
}

impl Default for FbankOptions {
    fn default() -> Self {
        Self {
            sample_frequency: 16000.0,
            frame_length_ms: 25.0,
            frame_shift_ms: 10.0,
            num_mel_bins: 80,
            low_freq: 20.0,
            high_freq: 0.0,
            preemphasis: 0.97,
            remove_dc_offset: true,
        }
    }
}

impl FbankOptions {
    /// Samples per frame.
    pub fn window_size(&self) -> usize {
        (self.sample_frequency * self.frame_length_ms * 0.001) as usize
    }

    /// Samples between frame starts.
    pub fn window_shift(&self) -> usize {
        (self.sample_frequency * self.frame_shift_ms * 0.001) as usize
    }

    /// FFT size: the window size rounded up to a power of two.
    pub fn padded_window_size(&self) -> usize {
        self.window_size().next_power_of_two()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_mel_bins < 3 {
            return Err(RunnerError::FeatureError(
                "num_mel_bins must be at least 3".to_string(),
            ));
        }
        if self.window_size() < 2 || self.window_shift() == 0 {
            return Err(RunnerError::FeatureError(format!(
                "Frame of {}ms / {}ms at {}Hz is empty",
                self.frame_length_ms, self.frame_shift_ms, self.sample_frequency
            )));
        }
        kaldi_mel_banks(
            self.num_mel_bins,
            self.padded_window_size(),
            self.sample_frequency,
            self.low_freq,
            self.high_freq,
        )?;
        Ok(())
    }
}

/// Number of frames produced with `snip_edges` framing.
pub fn num_frames(num_samples: usize, window_size: usize, window_shift: usize) -> usize {
    if num_samples < window_size {
        0
    } else {
        1 + (num_samples - window_size) / window_shift
    }
}

/// Povey window: a Hann window raised to the power 0.85.
fn povey_window(size: usize) -> Vec<f32> {
    let denom = (size - 1) as f32;
    (0..size)
        .map(|i| {
            let hann = 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos();
            hann.powf(0.85)
        })
        .collect()
}

/// Compute `[frames, num_mel_bins]` log mel energies.
pub fn fbank(samples: &[f32], opts: &FbankOptions) -> Result<Array2<f32>> {
    let window_size = opts.window_size();
    let window_shift = opts.window_shift();
    let padded = opts.padded_window_size();

    let frames = num_frames(samples.len(), window_size, window_shift);
    if frames == 0 {
        return Err(too_short(samples.len(), window_size, opts.sample_frequency));
    }

    let banks = kaldi_mel_banks(
        opts.num_mel_bins,
        padded,
        opts.sample_frequency,
        opts.low_freq,
        opts.high_freq,
    )?;
    let window = povey_window(window_size);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(padded);

    let num_fft_bins = padded / 2;
    let mut power = Array2::<f32>::zeros((frames, num_fft_bins));
    let mut frame = vec![0.0f32; window_size];
    let mut buffer = vec![Complex::new(0.0f32, 0.0); padded];

    for f in 0..frames {
        let start = f * window_shift;
        frame.copy_from_slice(&samples[start..start + window_size]);

        if opts.remove_dc_offset {
            let mean = frame.iter().sum::<f32>() / window_size as f32;
            frame.iter_mut().for_each(|s| *s -= mean);
        }

        if opts.preemphasis != 0.0 {
            for i in (1..window_size).rev() {
                frame[i] -= opts.preemphasis * frame[i - 1];
            }
            frame[0] -= opts.preemphasis * frame[0];
        }

        for (slot, (s, w)) in buffer.iter_mut().zip(frame.iter().zip(&window)) {
            *slot = Complex::new(s * w, 0.0);
        }
        buffer[window_size..]
            .iter_mut()
            .for_each(|c| *c = Complex::new(0.0, 0.0));

        fft.process(&mut buffer);

        for (k, c) in buffer.iter().take(num_fft_bins).enumerate() {
            power[[f, k]] = c.norm_sqr();
        }
    }

    let mut energies = power.dot(&banks);
    energies.mapv_inplace(|e| e.max(f32::EPSILON).ln());
    Ok(energies)
}
