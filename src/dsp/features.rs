// src/dsp/features.rs
//! Frame-level spectral descriptors computed on the shared STFT grid.

/// Spectral centroid per frame: magnitude-weighted mean frequency.
pub fn spectral_centroid(mag_frames: &[Vec<f64>], freqs: &[f64]) -> Vec<f64> {
    mag_frames
        .iter()
        .map(|frame| {
            let total: f64 = frame.iter().sum();
            if total <= 0.0 {
                return 0.0;
            }
            frame
                .iter()
                .zip(freqs.iter())
                .map(|(m, f)| m * f)
                .sum::<f64>()
                / total
        })
        .collect()
}

/// Spectral bandwidth per frame: magnitude-weighted standard deviation
/// around the centroid (p = 2).
pub fn spectral_bandwidth(mag_frames: &[Vec<f64>], freqs: &[f64], centroids: &[f64]) -> Vec<f64> {
    mag_frames
        .iter()
        .zip(centroids.iter())
        .map(|(frame, &c)| {
            let total: f64 = frame.iter().sum();
            if total <= 0.0 {
                return 0.0;
            }
            let var = frame
                .iter()
                .zip(freqs.iter())
                .map(|(m, f)| (m / total) * (f - c) * (f - c))
                .sum::<f64>();
            var.sqrt()
        })
        .collect()
}

/// Roll-off frequency per frame: smallest frequency below which `roll` of
/// the spectral magnitude is contained.
pub fn spectral_rolloff(mag_frames: &[Vec<f64>], freqs: &[f64], roll: f64) -> Vec<f64> {
    mag_frames
        .iter()
        .map(|frame| {
            let total: f64 = frame.iter().sum();
            if total <= 0.0 {
                return 0.0;
            }
            let threshold = roll * total;
            let mut cumulative = 0.0;
            for (m, &f) in frame.iter().zip(freqs.iter()) {
                cumulative += m;
                if cumulative >= threshold {
                    return f;
                }
            }
            *freqs.last().unwrap_or(&0.0)
        })
        .collect()
}

/// Zero-crossing rate per frame over edge-padded frames of the raw signal,
/// on the same frame grid as the STFT.
pub fn zero_crossing_rate(x: &[f64], frame_length: usize, hop: usize) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let pad = frame_length / 2;
    let mut padded = Vec::with_capacity(x.len() + 2 * pad);
    padded.extend(std::iter::repeat(x[0]).take(pad));
    padded.extend_from_slice(x);
    padded.extend(std::iter::repeat(*x.last().unwrap()).take(pad));

    let frames = 1 + x.len() / hop;
    (0..frames)
        .map(|t| {
            let start = t * hop;
            let frame = &padded[start..start + frame_length];
            let crossings = frame
                .windows(2)
                .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
                .count();
            crossings as f64 / frame_length as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_of_single_bin_is_its_frequency() {
        let freqs = vec![0.0, 100.0, 200.0, 300.0];
        let frames = vec![vec![0.0, 0.0, 5.0, 0.0]];
        let c = spectral_centroid(&frames, &freqs);
        assert!((c[0] - 200.0).abs() < 1e-12);
    }

    #[test]
    fn bandwidth_zero_for_single_bin() {
        let freqs = vec![0.0, 100.0, 200.0, 300.0];
        let frames = vec![vec![0.0, 0.0, 5.0, 0.0]];
        let c = spectral_centroid(&frames, &freqs);
        let bw = spectral_bandwidth(&frames, &freqs, &c);
        assert!(bw[0].abs() < 1e-12);
    }

    #[test]
    fn rolloff_reaches_the_mass() {
        let freqs = vec![0.0, 100.0, 200.0, 300.0];
        let frames = vec![vec![1.0, 1.0, 1.0, 1.0]];
        let r = spectral_rolloff(&frames, &freqs, 0.85);
        assert!((r[0] - 300.0).abs() < 1e-12);
    }

    #[test]
    fn zcr_counts_alternating_signal() {
        let x: Vec<f64> = (0..4096).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let rates = zero_crossing_rate(&x, 2048, 512);
        assert_eq!(rates.len(), 1 + 4096 / 512);
        for rate in rates {
            assert!(rate > 0.9, "rate {rate}");
        }
    }

    #[test]
    fn zcr_zero_for_constant_signal() {
        let x = vec![0.5; 4096];
        let rates = zero_crossing_rate(&x, 2048, 512);
        assert!(rates.iter().all(|r| *r == 0.0));
    }
}
