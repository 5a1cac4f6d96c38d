// src/dsp/mel.rs
//! Mel filterbank, dB conversion, and MFCC extraction (Slaney mel scale,
//! triangular filters with Slaney area normalization, orthonormal DCT-II).

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
const AMIN: f64 = 1e-10;

fn logstep() -> f64 {
    (6.4f64).ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / logstep()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * ((mel - MIN_LOG_MEL) * logstep()).exp()
    } else {
        mel * F_SP
    }
}

/// Triangular mel filterbank, `[n_mels][n_fft / 2 + 1]`, spanning
/// 0 Hz .. sample_rate / 2.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f64>> {
    let n_bins = n_fft / 2 + 1;
    let fmax = sample_rate as f64 / 2.0;

    let mel_max = hz_to_mel(fmax);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();

    let bin_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let mut bank = vec![vec![0.0; n_bins]; n_mels];
    for m in 0..n_mels {
        let lower = mel_points[m];
        let center = mel_points[m + 1];
        let upper = mel_points[m + 2];
        // Slaney normalization keeps constant energy per band.
        let enorm = 2.0 / (upper - lower);
        for (k, &f) in bin_freqs.iter().enumerate() {
            let rising = (f - lower) / (center - lower);
            let falling = (upper - f) / (upper - center);
            let weight = rising.min(falling).max(0.0);
            bank[m][k] = weight * enorm;
        }
    }
    bank
}

/// Apply the filterbank to power frames: `[frames][bins]` ->
/// `[n_mels][frames]`.
pub fn apply_filterbank(bank: &[Vec<f64>], power_frames: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let frames = power_frames.len();
    let mut out = vec![vec![0.0; frames]; bank.len()];
    for (m, filter) in bank.iter().enumerate() {
        for (t, frame) in power_frames.iter().enumerate() {
            let mut acc = 0.0;
            for (w, p) in filter.iter().zip(frame.iter()) {
                acc += w * p;
            }
            out[m][t] = acc;
        }
    }
    out
}

/// Convert a power matrix to decibels relative to `ref_value`, clamped to
/// `top_db` below the peak.
pub fn power_to_db(power: &[Vec<f64>], ref_value: f64, top_db: f64) -> Vec<Vec<f64>> {
    let ref_db = 10.0 * ref_value.max(AMIN).log10();
    let mut out: Vec<Vec<f64>> = power
        .iter()
        .map(|row| {
            row.iter()
                .map(|&p| 10.0 * p.max(AMIN).log10() - ref_db)
                .collect()
        })
        .collect();

    let peak = out
        .iter()
        .flat_map(|row| row.iter())
        .fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    let floor = peak - top_db;
    for row in out.iter_mut() {
        for v in row.iter_mut() {
            *v = v.max(floor);
        }
    }
    out
}

/// Maximum entry of a power matrix (for `ref = max` dB conversion).
pub fn matrix_max(values: &[Vec<f64>]) -> f64 {
    values
        .iter()
        .flat_map(|row| row.iter())
        .fold(f64::NEG_INFINITY, |m, &v| m.max(v))
}

/// Orthonormal DCT-II along the first axis: `[n_in][frames]` ->
/// `[n_out][frames]`.
pub fn dct_ii_ortho(input: &[Vec<f64>], n_out: usize) -> Vec<Vec<f64>> {
    let n_in = input.len();
    if n_in == 0 {
        return Vec::new();
    }
    let frames = input[0].len();
    let scale0 = (1.0 / n_in as f64).sqrt();
    let scale = (2.0 / n_in as f64).sqrt();

    let mut out = vec![vec![0.0; frames]; n_out.min(n_in)];
    for (k, row) in out.iter_mut().enumerate() {
        let factor = if k == 0 { scale0 } else { scale };
        for t in 0..frames {
            let mut acc = 0.0;
            for (n, in_row) in input.iter().enumerate() {
                let angle =
                    std::f64::consts::PI * k as f64 * (2 * n + 1) as f64 / (2 * n_in) as f64;
                acc += in_row[t] * angle.cos();
            }
            row[t] = factor * acc;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mel_scale_roundtrip() {
        for hz in [0.0, 110.0, 440.0, 1000.0, 4000.0, 11_025.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 1e-6, "roundtrip {hz} -> {back}");
        }
    }

    #[test]
    fn filterbank_shape_and_coverage() {
        let bank = mel_filterbank(22_050, 2048, 128);
        assert_eq!(bank.len(), 128);
        assert_eq!(bank[0].len(), 1025);
        // Every filter except possibly the extremes has some weight.
        let empty = bank.iter().filter(|f| f.iter().all(|&w| w == 0.0)).count();
        assert!(empty <= 2, "{empty} empty filters");
    }

    #[test]
    fn power_to_db_ref_max_peaks_at_zero() {
        let power = vec![vec![1.0, 4.0], vec![0.25, 2.0]];
        let db = power_to_db(&power, matrix_max(&power), 80.0);
        let peak = matrix_max(&db);
        assert!(peak.abs() < 1e-9);
        assert!((db[0][1] - 0.0).abs() < 1e-9);
        assert!((db[0][0] - (-6.0206)).abs() < 1e-3);
    }

    #[test]
    fn dct_of_constant_concentrates_in_first_coefficient() {
        let input = vec![vec![1.0]; 16];
        let out = dct_ii_ortho(&input, 4);
        assert!((out[0][0] - 4.0).abs() < 1e-9); // sqrt(16) * 1
        for row in &out[1..] {
            assert!(row[0].abs() < 1e-9);
        }
    }
}
