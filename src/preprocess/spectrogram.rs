// src/preprocess/spectrogram.rs
//! Mel spectrogram (or MFCC matrix) input for the murmur-severity network.

use ndarray::Array2;

use crate::core::error::DspError;
use crate::dsp::mel::{apply_filterbank, dct_ii_ortho, matrix_max, mel_filterbank, power_to_db};
use crate::dsp::resample::{resample_fft, resampled_len};
use crate::dsp::stft::Stft;
use crate::dsp::zscore;

const TOP_DB: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrogramMode {
    Mel,
    Mfcc,
}

#[derive(Debug, Clone)]
pub struct PcgSpectrogramConfig {
    pub sample_rate: u32,
    pub n_mels: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub mode: SpectrogramMode,
}

impl Default for PcgSpectrogramConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            n_mels: 128,
            n_fft: 2048,
            hop_length: 512,
            mode: SpectrogramMode::Mel,
        }
    }
}

pub struct PcgSpectrogramPreprocessor {
    cfg: PcgSpectrogramConfig,
    stft: Stft,
    mel_bank: Vec<Vec<f64>>,
}

impl PcgSpectrogramPreprocessor {
    pub fn new(cfg: PcgSpectrogramConfig) -> Self {
        Self {
            stft: Stft::new(cfg.n_fft, cfg.hop_length),
            mel_bank: mel_filterbank(cfg.sample_rate, cfg.n_fft, cfg.n_mels),
            cfg,
        }
    }

    /// Resample, normalize, and produce an `[n_mels, frames]` matrix.
    pub fn process(
        &self,
        audio: &[f32],
        original_sr: Option<u32>,
    ) -> Result<Array2<f32>, DspError> {
        if audio.is_empty() {
            return Err(DspError::EmptyInput);
        }
        let mut x: Vec<f64> = audio.iter().map(|&v| v as f64).collect();

        if let Some(sr) = original_sr {
            if sr != self.cfg.sample_rate {
                let out_len = resampled_len(x.len(), sr, self.cfg.sample_rate);
                x = resample_fft(&x, out_len);
            }
        }

        zscore(&mut x);

        let power_frames = self.stft.power_frames(&x);
        let mel = apply_filterbank(&self.mel_bank, &power_frames);

        let matrix = match self.cfg.mode {
            SpectrogramMode::Mel => power_to_db(&mel, matrix_max(&mel), TOP_DB),
            SpectrogramMode::Mfcc => {
                let mel_db = power_to_db(&mel, 1.0, TOP_DB);
                dct_ii_ortho(&mel_db, self.cfg.n_mels)
            }
        };

        let rows = matrix.len();
        let cols = matrix.first().map_or(0, |r| r.len());
        let out = Array2::from_shape_fn((rows, cols), |(m, t)| matrix[m][t] as f32);
        if out.iter().any(|v| !v.is_finite()) {
            return Err(DspError::NonFinite {
                stage: "pcg_spectrogram",
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(freq: f64, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sr as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn mel_output_shape_follows_hop_grid() {
        let pp = PcgSpectrogramPreprocessor::new(PcgSpectrogramConfig::default());
        let audio = tone(200.0, 22_050, 22_050);
        let spec = pp.process(&audio, Some(22_050)).expect("process");
        assert_eq!(spec.nrows(), 128);
        assert_eq!(spec.ncols(), 1 + 22_050 / 512);
    }

    #[test]
    fn db_scale_peaks_at_zero() {
        let pp = PcgSpectrogramPreprocessor::new(PcgSpectrogramConfig::default());
        let audio = tone(200.0, 22_050, 22_050);
        let spec = pp.process(&audio, Some(22_050)).expect("process");
        let max = spec.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        assert!(max.abs() < 1e-3, "peak {max}");
        let min = spec.iter().fold(f32::INFINITY, |m, &v| m.min(v));
        assert!(min >= -80.0 - 1e-3);
    }

    #[test]
    fn deterministic_across_runs() {
        let pp = PcgSpectrogramPreprocessor::new(PcgSpectrogramConfig::default());
        let audio = tone(150.0, 22_050, 11_025);
        let a = pp.process(&audio, Some(22_050)).expect("first");
        let b = pp.process(&audio, Some(22_050)).expect("second");
        assert_eq!(a, b);
    }

    #[test]
    fn mfcc_mode_keeps_row_count() {
        let cfg = PcgSpectrogramConfig {
            mode: SpectrogramMode::Mfcc,
            ..Default::default()
        };
        let pp = PcgSpectrogramPreprocessor::new(cfg);
        let audio = tone(150.0, 22_050, 11_025);
        let spec = pp.process(&audio, Some(22_050)).expect("process");
        assert_eq!(spec.nrows(), 128);
    }
}
