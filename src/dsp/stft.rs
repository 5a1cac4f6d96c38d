// src/dsp/stft.rs
//! Short-time Fourier transform on the standard centered grid: periodic
//! Hann window, reflect padding of n_fft / 2 on both sides, frame count
//! `1 + floor(n / hop)`.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

pub struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let window = (0..n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n_fft as f64).cos()))
            .collect();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);
        Self {
            n_fft,
            hop,
            window,
            fft,
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn num_frames(&self, signal_len: usize) -> usize {
        1 + signal_len / self.hop
    }

    /// Center frequency of every FFT bin in Hz.
    pub fn bin_frequencies(&self, sample_rate: u32) -> Vec<f64> {
        (0..self.n_bins())
            .map(|k| k as f64 * sample_rate as f64 / self.n_fft as f64)
            .collect()
    }

    /// Magnitude spectrogram, `[frames][bins]`.
    pub fn magnitude_frames(&self, x: &[f64]) -> Vec<Vec<f64>> {
        let padded = reflect_pad(x, self.n_fft / 2);
        let frames = self.num_frames(x.len());
        let bins = self.n_bins();

        let mut out = Vec::with_capacity(frames);
        let mut buf = vec![Complex64::new(0.0, 0.0); self.n_fft];
        for t in 0..frames {
            let start = t * self.hop;
            for (i, slot) in buf.iter_mut().enumerate() {
                *slot = Complex64::new(padded[start + i] * self.window[i], 0.0);
            }
            self.fft.process(&mut buf);
            out.push(buf[..bins].iter().map(|c| c.norm()).collect());
        }
        out
    }

    /// Power spectrogram, `[frames][bins]`.
    pub fn power_frames(&self, x: &[f64]) -> Vec<Vec<f64>> {
        let mut frames = self.magnitude_frames(x);
        for frame in frames.iter_mut() {
            for v in frame.iter_mut() {
                *v *= *v;
            }
        }
        frames
    }
}

/// Reflect padding without repeating the edge sample. Handles pads longer
/// than the signal by bouncing between the edges.
pub fn reflect_pad(x: &[f64], pad: usize) -> Vec<f64> {
    let n = x.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    for i in 0..pad {
        let idx = pad as isize - i as isize;
        out.push(x[reflect_index(idx, n)]);
    }
    out.extend_from_slice(x);
    for i in 1..=pad {
        out.push(x[reflect_index(n as isize - 1 + i as isize, n)]);
    }
    out
}

fn reflect_index(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1) as isize;
    let mut j = i.rem_euclid(period);
    if j >= n as isize {
        j = period - j;
    }
    j as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_matches_grid() {
        let stft = Stft::new(2048, 512);
        assert_eq!(stft.num_frames(22_050), 1 + 22_050 / 512);
        assert_eq!(stft.magnitude_frames(&vec![0.5; 8192]).len(), 1 + 8192 / 512);
    }

    #[test]
    fn reflect_pad_mirrors_without_edge_repeat() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let padded = reflect_pad(&x, 2);
        assert_eq!(padded, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn tone_peaks_in_matching_bin() {
        let sr = 22_050u32;
        let stft = Stft::new(2048, 512);
        let freq = 430.7; // two bins up from 215.3 Hz spacing
        let x: Vec<f64> = (0..8192)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sr as f64).sin())
            .collect();
        let frames = stft.magnitude_frames(&x);
        let mid = &frames[frames.len() / 2];
        let peak_bin = mid
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(k, _)| k)
            .unwrap();
        let expected = (freq * 2048.0 / sr as f64).round() as usize;
        assert!(
            (peak_bin as isize - expected as isize).abs() <= 1,
            "peak bin {peak_bin} expected near {expected}"
        );
    }
}
