// src/preprocess/pcg.rs
//! PCG feature extraction for the heart-sound classifier.

use crate::core::error::DspError;
use crate::dsp::features::{
    spectral_bandwidth, spectral_centroid, spectral_rolloff, zero_crossing_rate,
};
use crate::dsp::filters::{butter_bandpass, sosfiltfilt, Sos};
use crate::dsp::mel::{apply_filterbank, dct_ii_ortho, mel_filterbank, power_to_db};
use crate::dsp::resample::{resample_fft, resampled_len};
use crate::dsp::stft::Stft;
use crate::dsp::{mean_std, zscore};

/// 13 MFCC means + 13 MFCC stddevs + centroid, rolloff, bandwidth and
/// zero-crossing rate as mean/stddev pairs.
pub const PCG_FEATURE_LEN: usize = 34;

const N_FFT: usize = 2048;
const HOP_LENGTH: usize = 512;
const N_MELS: usize = 128;
const ROLLOFF: f64 = 0.85;
const TOP_DB: f64 = 80.0;

#[derive(Debug, Clone)]
pub struct PcgFeatureConfig {
    pub sample_rate: u32,
    pub target_duration_sec: f64,
    pub bandpass_low_hz: f64,
    pub bandpass_high_hz: f64,
    pub n_mfcc: usize,
}

impl Default for PcgFeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            target_duration_sec: 10.0,
            bandpass_low_hz: 20.0,
            bandpass_high_hz: 400.0,
            n_mfcc: 13,
        }
    }
}

pub struct PcgFeaturePreprocessor {
    cfg: PcgFeatureConfig,
    target_samples: usize,
    sos: Vec<Sos>,
    stft: Stft,
    mel_bank: Vec<Vec<f64>>,
}

impl PcgFeaturePreprocessor {
    pub fn new(cfg: PcgFeatureConfig) -> Result<Self, DspError> {
        let sos = butter_bandpass(
            4,
            cfg.bandpass_low_hz,
            cfg.bandpass_high_hz,
            cfg.sample_rate,
        )?;
        let target_samples = (cfg.sample_rate as f64 * cfg.target_duration_sec) as usize;
        Ok(Self {
            stft: Stft::new(N_FFT, HOP_LENGTH),
            mel_bank: mel_filterbank(cfg.sample_rate, N_FFT, N_MELS),
            sos,
            target_samples,
            cfg,
        })
    }

    pub fn target_samples(&self) -> usize {
        self.target_samples
    }

    /// Full pipeline: resample, fix duration, bandpass, normalize, extract
    /// the 34-element feature vector.
    pub fn process(&self, audio: &[f32], original_sr: Option<u32>) -> Result<Vec<f32>, DspError> {
        let mut x: Vec<f64> = audio.iter().map(|&v| v as f64).collect();

        if let Some(sr) = original_sr {
            if sr != self.cfg.sample_rate && !x.is_empty() {
                let out_len = resampled_len(x.len(), sr, self.cfg.sample_rate);
                x = resample_fft(&x, out_len);
            }
        }

        // Pad with zeros or truncate to the target duration.
        x.resize(self.target_samples, 0.0);

        x = sosfiltfilt(&self.sos, &x)?;
        zscore(&mut x);

        let features = self.extract_features(&x);
        if features.iter().any(|v| !v.is_finite()) {
            return Err(DspError::NonFinite {
                stage: "pcg_features",
            });
        }
        Ok(features.into_iter().map(|v| v as f32).collect())
    }

    fn extract_features(&self, x: &[f64]) -> Vec<f64> {
        let mag_frames = self.stft.magnitude_frames(x);
        let power_frames: Vec<Vec<f64>> = mag_frames
            .iter()
            .map(|frame| frame.iter().map(|m| m * m).collect())
            .collect();

        // MFCCs over the dB-scaled mel spectrogram.
        let mel = apply_filterbank(&self.mel_bank, &power_frames);
        let mel_db = power_to_db(&mel, 1.0, TOP_DB);
        let mfcc = dct_ii_ortho(&mel_db, self.cfg.n_mfcc);

        let freqs = self.stft.bin_frequencies(self.cfg.sample_rate);
        let centroid = spectral_centroid(&mag_frames, &freqs);
        let rolloff = spectral_rolloff(&mag_frames, &freqs, ROLLOFF);
        let bandwidth = spectral_bandwidth(&mag_frames, &freqs, &centroid);
        let zcr = zero_crossing_rate(x, N_FFT, HOP_LENGTH);

        let mut out = Vec::with_capacity(PCG_FEATURE_LEN);
        for row in &mfcc {
            out.push(mean_std(row).0);
        }
        for row in &mfcc {
            out.push(mean_std(row).1);
        }
        for series in [&centroid, &rolloff, &bandwidth, &zcr] {
            let (mean, std) = mean_std(series);
            out.push(mean);
            out.push(std);
        }
        out
    }
}
