// src/dsp/resample.rs
//! FFT-domain resampling: forward transform, spectrum truncation or
//! zero-padding, inverse transform, amplitude rescale. The Nyquist bin is
//! split when upsampling and folded when downsampling so real inputs stay
//! real.

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

/// Resample `x` to exactly `num_out` samples.
pub fn resample_fft(x: &[f64], num_out: usize) -> Vec<f64> {
    let n = x.len();
    let m = num_out;
    if n == 0 || m == 0 {
        return Vec::new();
    }
    if n == m {
        return x.to_vec();
    }

    let mut planner = FftPlanner::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(m);

    let mut buf: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    forward.process(&mut buf);

    let mut spec = vec![Complex64::new(0.0, 0.0); m];
    let nmin = n.min(m);

    // Positive frequencies excluding Nyquist.
    for k in 0..(nmin + 1) / 2 {
        spec[k] = buf[k];
    }
    // Negative frequencies excluding Nyquist.
    for j in 1..=(nmin.saturating_sub(1)) / 2 {
        spec[m - j] = buf[n - j];
    }

    if nmin % 2 == 0 {
        let half = nmin / 2;
        if m > n {
            // Upsampling: split the old Nyquist bin across both sides.
            let nyq = buf[half] * 0.5;
            spec[half] = nyq;
            spec[m - half] = nyq;
        } else {
            // Downsampling: fold the aliasing pair onto the new Nyquist.
            spec[half] = buf[half] + buf[n - half];
        }
    }

    inverse.process(&mut spec);
    let scale = 1.0 / n as f64;
    spec.into_iter().map(|c| c.re * scale).collect()
}

/// Output length for a sample-rate conversion, rounded to nearest.
pub fn resampled_len(len: usize, from_sr: u32, to_sr: u32) -> usize {
    ((len as f64) * to_sr as f64 / from_sr as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, sr: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sr).sin())
            .collect()
    }

    #[test]
    fn identity_when_rates_match() {
        let x = sine(5.0, 100.0, 256);
        assert_eq!(resample_fft(&x, 256), x);
    }

    #[test]
    fn downsample_halves_length() {
        let x = sine(10.0, 1000.0, 1000);
        let y = resample_fft(&x, 500);
        assert_eq!(y.len(), 500);
        // A 10 Hz tone sampled at 500 Hz: compare against the expected tone
        // away from the ends.
        let expected = sine(10.0, 500.0, 500);
        for i in 50..450 {
            assert!((y[i] - expected[i]).abs() < 0.02, "sample {i}");
        }
    }

    #[test]
    fn upsample_preserves_tone() {
        let x = sine(10.0, 500.0, 500);
        let y = resample_fft(&x, 1000);
        assert_eq!(y.len(), 1000);
        let expected = sine(10.0, 1000.0, 1000);
        for i in 100..900 {
            assert!((y[i] - expected[i]).abs() < 0.02, "sample {i}");
        }
    }

    #[test]
    fn resampled_len_rounds() {
        assert_eq!(resampled_len(1000, 1000, 500), 500);
        assert_eq!(resampled_len(44_100, 44_100, 22_050), 22_050);
        assert_eq!(resampled_len(3, 2, 3), 5);
    }
}
