//! Mel scales and triangular filter banks.
//!
//! Two conventions are implemented because the two feature families were
//! trained against different reference implementations:
//!
//! - Kaldi: `1127 * ln(1 + f / 700)`, triangles evaluated in the mel domain
//! - HTK (torchaudio): `2595 * log10(1 + f / 700)`, triangles evaluated in Hz
//!
//! Both banks are returned as `[fft_bins, mel_bins]` so a power spectrum
//! matrix can be projected with a single `dot`.

use ndarray::Array2;

use crate::error::{Result, RunnerError};

/// Kaldi mel scale.
pub fn kaldi_mel(freq: f32) -> f32 {
    1127.0 * (1.0 + freq / 700.0).ln()
}

/// HTK mel scale.
pub fn htk_mel(freq: f32) -> f32 {
    2595.0 * (1.0 + freq / 700.0).log10()
}

/// Inverse of [`htk_mel`].
pub fn htk_mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Kaldi filter bank over the first `padded_window / 2` FFT bins.
///
/// `high_freq <= 0` is taken as an offset from Nyquist, as in Kaldi.
pub fn kaldi_mel_banks(
    num_bins: usize,
    padded_window: usize,
    sample_freq: f32,
    low_freq: f32,
    high_freq: f32,
) -> Result<Array2<f32>> {
    let nyquist = 0.5 * sample_freq;
    let high_freq = if high_freq <= 0.0 {
        nyquist + high_freq
    } else {
        high_freq
    };

    if !(0.0..nyquist).contains(&low_freq) || high_freq <= low_freq || high_freq > nyquist {
        return Err(RunnerError::FeatureError(format!(
            "Bad mel frequency range: low {low_freq} high {high_freq} nyquist {nyquist}"
        )));
    }

    let num_fft_bins = padded_window / 2;
    let fft_bin_width = sample_freq / padded_window as f32;
    let mel_low = kaldi_mel(low_freq);
    let mel_high = kaldi_mel(high_freq);
    let mel_delta = (mel_high - mel_low) / (num_bins as f32 + 1.0);

    let mut banks = Array2::<f32>::zeros((num_fft_bins, num_bins));
    for bin in 0..num_bins {
        let left = mel_low + bin as f32 * mel_delta;
        let center = left + mel_delta;
        let right = center + mel_delta;

        for i in 0..num_fft_bins {
            let mel = kaldi_mel(fft_bin_width * i as f32);
            if mel > left && mel < right {
                banks[[i, bin]] = if mel <= center {
                    (mel - left) / (center - left)
                } else {
                    (right - mel) / (right - center)
                };
            }
        }
    }
    Ok(banks)
}

/// HTK filter bank over `n_freqs` linearly spaced bins from 0 to Nyquist.
pub fn htk_mel_banks(
    n_freqs: usize,
    f_min: f32,
    f_max: f32,
    n_mels: usize,
    sample_rate: u32,
) -> Array2<f32> {
    let nyquist = sample_rate as f32 / 2.0;
    let freq_step = if n_freqs > 1 {
        nyquist / (n_freqs - 1) as f32
    } else {
        0.0
    };

    let m_min = htk_mel(f_min);
    let m_max = htk_mel(f_max);
    let f_pts: Vec<f32> = (0..n_mels + 2)
        .map(|i| htk_mel_to_hz(m_min + (m_max - m_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut banks = Array2::<f32>::zeros((n_freqs, n_mels));
    for m in 0..n_mels {
        let (lo, mid, hi) = (f_pts[m], f_pts[m + 1], f_pts[m + 2]);
        for i in 0..n_freqs {
            let freq = freq_step * i as f32;
            let down = (freq - lo) / (mid - lo);
            let up = (hi - freq) / (hi - mid);
            banks[[i, m]] = down.min(up).max(0.0);
        }
    }
    banks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_scales() {
        assert!(kaldi_mel(0.0).abs() < 1e-6);
        assert!(htk_mel(0.0).abs() < 1e-6);
        // 1000 Hz is close to 1000 mel on both scales
        assert!((kaldi_mel(1000.0) - 1000.0).abs() < 1.0);
        assert!((htk_mel(1000.0) - 1000.0).abs() < 1.0);
        assert!((htk_mel_to_hz(htk_mel(4321.0)) - 4321.0).abs() < 0.5);
    }

    #[test]
    fn test_kaldi_banks_shape_and_range() {
        let banks = kaldi_mel_banks(80, 512, 16000.0, 20.0, 0.0).unwrap();
        assert_eq!(banks.dim(), (256, 80));
        assert!(banks.iter().all(|&w| (0.0..=1.0).contains(&w)));
        // every triangle covers at least one FFT bin
        for col in banks.columns() {
            assert!(col.sum() > 0.0);
        }
    }

    #[test]
    fn test_kaldi_banks_reject_bad_range() {
        assert!(kaldi_mel_banks(23, 512, 16000.0, 9000.0, 0.0).is_err());
        assert!(kaldi_mel_banks(23, 512, 16000.0, 300.0, 200.0).is_err());
    }

    #[test]
    fn test_htk_banks_non_negative() {
        let banks = htk_mel_banks(513, 50.0, 14000.0, 64, 32000);
        assert_eq!(banks.dim(), (513, 64));
        assert!(banks.iter().all(|&w| w >= 0.0 && w <= 1.0 + 1e-6));
        // no weight outside [f_min, f_max]
        assert_eq!(banks.row(0).sum(), 0.0);
        assert_eq!(banks.row(512).sum(), 0.0);
    }
}
