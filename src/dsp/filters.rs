// src/dsp/filters.rs
//! Butterworth filter design and zero-phase filtering.
//!
//! Filters are designed from the analog Butterworth prototype (bandpass or
//! highpass transform, bilinear mapping) and realized as cascaded biquad
//! sections in direct form II transposed. Zero-phase application runs the
//! cascade forward and backward over an odd-extended signal with
//! steady-state initial conditions, so step offsets at the edges do not
//! leak transients into the output.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use crate::core::error::DspError;

/// One second-order section. `a[0]` is always 1.
#[derive(Debug, Clone, Copy)]
pub struct Sos {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

/// Left-half-plane poles of the analog Butterworth prototype of the given
/// order, on the unit circle.
fn prototype_poles(order: usize) -> Vec<Complex64> {
    (0..order)
        .map(|k| {
            let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
            Complex64::from_polar(1.0, theta)
        })
        .collect()
}

/// Bilinear transform of an analog pole or zero at `fs2 = 2 * fs`.
fn bilinear(s: Complex64, fs2: f64) -> Complex64 {
    (Complex64::new(fs2, 0.0) + s) / (Complex64::new(fs2, 0.0) - s)
}

/// Pair digital poles into biquad denominators. Complex poles pair with
/// their conjugates; any real poles pair among themselves in order.
fn pole_sections(poles: &[Complex64]) -> Vec<[f64; 3]> {
    let mut sections = Vec::new();
    for p in poles.iter().filter(|p| p.im > 1e-12) {
        sections.push([1.0, -2.0 * p.re, p.norm_sqr()]);
    }
    let real: Vec<f64> = poles
        .iter()
        .filter(|p| p.im.abs() <= 1e-12)
        .map(|p| p.re)
        .collect();
    for pair in real.chunks(2) {
        match pair {
            [r1, r2] => sections.push([1.0, -(r1 + r2), r1 * r2]),
            [r] => sections.push([1.0, -r, 0.0]),
            _ => unreachable!(),
        }
    }
    sections
}

/// Cascade magnitude response at normalized frequency `omega` (rad/sample).
fn cascade_gain_at(sections: &[Sos], omega: f64) -> f64 {
    let z1 = Complex64::from_polar(1.0, -omega);
    let z2 = z1 * z1;
    let mut gain = 1.0;
    for s in sections {
        let num = Complex64::new(s.b[0], 0.0) + z1 * s.b[1] + z2 * s.b[2];
        let den = Complex64::new(s.a[0], 0.0) + z1 * s.a[1] + z2 * s.a[2];
        gain *= num.norm() / den.norm();
    }
    gain
}

/// Butterworth bandpass of the given prototype order (2 * order poles),
/// normalized to unit gain at the geometric center of the band.
pub fn butter_bandpass(
    order: usize,
    low_hz: f64,
    high_hz: f64,
    sample_rate: u32,
) -> Result<Vec<Sos>, DspError> {
    let nyquist = sample_rate as f64 / 2.0;
    if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist) {
        return Err(DspError::InvalidBandEdges {
            low: low_hz,
            high: high_hz,
            sample_rate,
        });
    }

    let fs = sample_rate as f64;
    let fs2 = 2.0 * fs;
    let wl = fs2 * (PI * low_hz / fs).tan();
    let wh = fs2 * (PI * high_hz / fs).tan();
    let w0 = (wl * wh).sqrt();
    let bw = wh - wl;

    // Lowpass prototype -> bandpass: each pole splits into a pair.
    let mut analog = Vec::with_capacity(2 * order);
    for p in prototype_poles(order) {
        let s = p * (bw / 2.0);
        let disc = (s * s - Complex64::new(w0 * w0, 0.0)).sqrt();
        analog.push(s + disc);
        analog.push(s - disc);
    }

    let digital: Vec<Complex64> = analog.iter().map(|&s| bilinear(s, fs2)).collect();

    // Zeros land at z = +1 (from s = 0) and z = -1 (bilinear padding), one
    // of each per section.
    let mut sections: Vec<Sos> = pole_sections(&digital)
        .into_iter()
        .map(|a| Sos {
            b: [1.0, 0.0, -1.0],
            a,
        })
        .collect();

    // Normalize to unit gain at the analog center frequency's image.
    let omega0 = 2.0 * (w0 / fs2).atan();
    let gain = cascade_gain_at(&sections, omega0);
    if gain > 0.0 {
        let scale = 1.0 / gain;
        for b in sections[0].b.iter_mut() {
            *b *= scale;
        }
    }
    Ok(sections)
}

/// Butterworth highpass, normalized to unit gain at Nyquist.
pub fn butter_highpass(
    order: usize,
    cutoff_hz: f64,
    sample_rate: u32,
) -> Result<Vec<Sos>, DspError> {
    let nyquist = sample_rate as f64 / 2.0;
    if !(cutoff_hz > 0.0 && cutoff_hz < nyquist) {
        return Err(DspError::InvalidBandEdges {
            low: cutoff_hz,
            high: cutoff_hz,
            sample_rate,
        });
    }

    let fs = sample_rate as f64;
    let fs2 = 2.0 * fs;
    let wc = fs2 * (PI * cutoff_hz / fs).tan();

    // Lowpass prototype -> highpass: p -> wc / p, zeros at s = 0.
    let analog: Vec<Complex64> = prototype_poles(order)
        .into_iter()
        .map(|p| Complex64::new(wc, 0.0) / p)
        .collect();
    let digital: Vec<Complex64> = analog.iter().map(|&s| bilinear(s, fs2)).collect();

    let mut sections: Vec<Sos> = pole_sections(&digital)
        .into_iter()
        .map(|a| {
            // First-order sections get one zero at z = +1, biquads get two.
            let b = if a[2] == 0.0 {
                [1.0, -1.0, 0.0]
            } else {
                [1.0, -2.0, 1.0]
            };
            Sos { b, a }
        })
        .collect();

    let gain = cascade_gain_at(&sections, PI);
    if gain > 0.0 {
        let scale = 1.0 / gain;
        for b in sections[0].b.iter_mut() {
            *b *= scale;
        }
    }
    Ok(sections)
}

/// Run one pass of the cascade over `x` with steady-state initial
/// conditions for a step of height `x0`.
fn sosfilt_steady(sections: &[Sos], x: &mut [f64], x0: f64) {
    let mut step = x0;
    for s in sections {
        let b = s.b;
        let a = s.a;
        let denom = 1.0 + a[1] + a[2];
        let h1 = if denom.abs() > 1e-300 {
            (b[0] + b[1] + b[2]) / denom
        } else {
            0.0
        };

        let mut z1 = (h1 - b[0]) * step;
        let mut z2 = b[2] * step - a[2] * h1 * step;

        for v in x.iter_mut() {
            let xn = *v;
            let yn = b[0] * xn + z1;
            z1 = b[1] * xn - a[1] * yn + z2;
            z2 = b[2] * xn - a[2] * yn;
            *v = yn;
        }
        step *= h1;
    }
}

/// Forward-backward (zero-phase) application of a biquad cascade with odd
/// extension at both edges.
pub fn sosfiltfilt(sections: &[Sos], x: &[f64]) -> Result<Vec<f64>, DspError> {
    if x.is_empty() {
        return Err(DspError::EmptyInput);
    }
    let padlen = (3 * (2 * sections.len() + 1)).min(x.len() - 1);
    if padlen == 0 && x.len() < 2 {
        return Err(DspError::TooShortForPadding {
            len: x.len(),
            padlen: 3 * (2 * sections.len() + 1),
        });
    }

    let n = x.len();
    let mut ext = Vec::with_capacity(n + 2 * padlen);
    for i in (1..=padlen).rev() {
        ext.push(2.0 * x[0] - x[i]);
    }
    ext.extend_from_slice(x);
    for i in 1..=padlen {
        ext.push(2.0 * x[n - 1] - x[n - 1 - i]);
    }

    let first = ext[0];
    sosfilt_steady(sections, &mut ext, first);
    ext.reverse();
    let first = ext[0];
    sosfilt_steady(sections, &mut ext, first);
    ext.reverse();

    Ok(ext[padlen..padlen + n].to_vec())
}

/// Moving-average smoothing, same-length output, zero padding at the edges.
pub fn moving_average(x: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || x.is_empty() {
        return x.to_vec();
    }
    let half = (window - 1) / 2;
    let n = x.len();
    let mut out = vec![0.0; n];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for j in 0..window {
            let idx = i as isize + j as isize - half as isize;
            if idx >= 0 && (idx as usize) < n {
                acc += x[idx as usize];
            }
        }
        *slot = acc / window as f64;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sr: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sr).sin())
            .collect()
    }

    #[test]
    fn bandpass_rejects_dc() {
        let sos = butter_bandpass(4, 20.0, 400.0, 22_050).expect("design");
        let x = vec![1.0; 4096];
        let y = sosfiltfilt(&sos, &x).expect("filter");
        let peak = y.iter().skip(100).take(3800).fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak < 1e-3, "DC leak {peak}");
    }

    #[test]
    fn bandpass_passes_center_band() {
        let sr = 22_050.0;
        let sos = butter_bandpass(4, 20.0, 400.0, 22_050).expect("design");
        let x = sine(90.0, sr, 8192);
        let y = sosfiltfilt(&sos, &x).expect("filter");
        // Compare RMS away from the edges.
        let rms = |v: &[f64]| (v.iter().map(|s| s * s).sum::<f64>() / v.len() as f64).sqrt();
        let ratio = rms(&y[1000..7000]) / rms(&x[1000..7000]);
        assert!((ratio - 1.0).abs() < 0.05, "center-band ratio {ratio}");
    }

    #[test]
    fn bandpass_attenuates_out_of_band() {
        let sr = 22_050.0;
        let sos = butter_bandpass(4, 20.0, 400.0, 22_050).expect("design");
        let x = sine(4000.0, sr, 8192);
        let y = sosfiltfilt(&sos, &x).expect("filter");
        let rms = |v: &[f64]| (v.iter().map(|s| s * s).sum::<f64>() / v.len() as f64).sqrt();
        assert!(rms(&y[1000..7000]) < 0.01);
    }

    #[test]
    fn highpass_removes_offset() {
        let sos = butter_highpass(1, 0.5, 500).expect("design");
        let x: Vec<f64> = sine(10.0, 500.0, 4000).iter().map(|v| v + 3.0).collect();
        let y = sosfiltfilt(&sos, &x).expect("filter");
        let mean = y[500..3500].iter().sum::<f64>() / 3000.0;
        assert!(mean.abs() < 0.05, "residual offset {mean}");
    }

    #[test]
    fn filtfilt_output_is_deterministic() {
        let sos = butter_bandpass(4, 0.5, 50.0, 500).expect("design");
        let x = sine(7.0, 500.0, 2000);
        let y1 = sosfiltfilt(&sos, &x).expect("filter");
        let y2 = sosfiltfilt(&sos, &x).expect("filter");
        assert_eq!(y1, y2);
    }

    #[test]
    fn moving_average_smooths_same_length() {
        let x = vec![0.0, 0.0, 5.0, 0.0, 0.0];
        let y = moving_average(&x, 5);
        assert_eq!(y.len(), x.len());
        assert!(y.iter().all(|v| (v - 1.0).abs() < 1e-12));
    }
}
