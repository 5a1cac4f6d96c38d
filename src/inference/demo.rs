// src/inference/demo.rs
//! Deterministic fallback predictions used when no models are loaded.
//! These rules are part of the public contract and are tested as such.

use crate::inference::labels::{
    GRADING_CLASSES, LOCATION_CLASSES, PITCH_CLASSES, QUALITY_CLASSES, SHAPE_CLASSES,
    TIMING_CLASSES,
};
use crate::inference::output::{probability_map, SeverityHead};

/// Mean-absolute-amplitude banding for PCG. A silent buffer reads as an
/// artifact, a loud one as a murmur, everything in between as normal.
pub fn pcg_rule(audio: &[f32]) -> (&'static str, [f64; 3]) {
    let mean_abs = if audio.is_empty() {
        0.0
    } else {
        audio.iter().map(|v| v.abs() as f64).sum::<f64>() / audio.len() as f64
    };

    if mean_abs < 1e-4 {
        ("Artifact", [0.15, 0.20, 0.65])
    } else if mean_abs > 0.25 {
        ("Murmur", [0.20, 0.70, 0.10])
    } else {
        ("Normal", [0.75, 0.15, 0.10])
    }
}

/// Variance banding for ECG beat classification.
pub fn ecg_rule(ecg: &[f32]) -> (&'static str, f64, [f64; 5]) {
    let variance = if ecg.is_empty() {
        0.0
    } else {
        let n = ecg.len() as f64;
        let mean = ecg.iter().map(|&v| v as f64).sum::<f64>() / n;
        ecg.iter()
            .map(|&v| (v as f64 - mean) * (v as f64 - mean))
            .sum::<f64>()
            / n
    };

    if variance > 2.0 {
        ("VEB", 0.68, [0.12, 0.10, 0.68, 0.06, 0.04])
    } else if variance > 1.0 {
        ("SVEB", 0.62, [0.20, 0.62, 0.08, 0.05, 0.05])
    } else {
        ("Normal", 0.81, [0.81, 0.08, 0.05, 0.03, 0.03])
    }
}

/// The canonical fixed severity analysis.
pub fn severity_canonical() -> [SeverityHead; 6] {
    let location_probs = [0.10, 0.45, 0.12, 0.08, 0.08, 0.05, 0.04, 0.03, 0.03, 0.02];
    let timing_probs = [0.10, 0.50, 0.15, 0.20, 0.05];
    let shape_probs = [0.15, 0.18, 0.50, 0.12, 0.05];
    let grading_probs = [0.05, 0.12, 0.38, 0.22, 0.10, 0.05, 0.08];
    let pitch_probs = [0.18, 0.50, 0.25, 0.07];
    let quality_probs = [0.48, 0.28, 0.15, 0.09];

    [
        head("MV", &LOCATION_CLASSES, &location_probs),
        head("Mid-systolic", &TIMING_CLASSES, &timing_probs),
        head("Crescendo-decrescendo", &SHAPE_CLASSES, &shape_probs),
        head("III/VI", &GRADING_CLASSES, &grading_probs),
        head("Medium", &PITCH_CLASSES, &pitch_probs),
        head("Blowing", &QUALITY_CLASSES, &quality_probs),
    ]
}

fn head(predicted: &str, labels: &[&str], probs: &[f64]) -> SeverityHead {
    SeverityHead {
        predicted: predicted.to_string(),
        probabilities: probability_map(labels, probs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_audio_is_artifact() {
        let (label, probs) = pcg_rule(&vec![0.0; 1000]);
        assert_eq!(label, "Artifact");
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn loud_audio_is_murmur() {
        let (label, _) = pcg_rule(&vec![0.6; 1000]);
        assert_eq!(label, "Murmur");
    }

    #[test]
    fn moderate_audio_is_normal() {
        let (label, _) = pcg_rule(&vec![0.1; 1000]);
        assert_eq!(label, "Normal");
    }

    #[test]
    fn ecg_variance_bands() {
        let calm: Vec<f32> = (0..1000).map(|i| if i % 2 == 0 { 0.4 } else { -0.4 }).collect();
        assert_eq!(ecg_rule(&calm).0, "Normal");

        let mid: Vec<f32> = (0..1000).map(|i| if i % 2 == 0 { 1.1 } else { -1.1 }).collect();
        assert_eq!(ecg_rule(&mid).0, "SVEB");

        let wild: Vec<f32> = (0..1000).map(|i| if i % 2 == 0 { 2.0 } else { -2.0 }).collect();
        assert_eq!(ecg_rule(&wild).0, "VEB");
    }

    #[test]
    fn canonical_severity_record() {
        let [location, timing, shape, grading, pitch, quality] = severity_canonical();
        assert_eq!(location.predicted, "MV");
        assert_eq!(timing.predicted, "Mid-systolic");
        assert_eq!(shape.predicted, "Crescendo-decrescendo");
        assert_eq!(grading.predicted, "III/VI");
        assert_eq!(pitch.predicted, "Medium");
        assert_eq!(quality.predicted, "Blowing");
        for h in [&location, &timing, &shape, &grading, &pitch, &quality] {
            let sum: f64 = h.probabilities.values().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }
}
