// src/inference/output.rs
//! Typed prediction records. Each modality gets its own variant with a
//! common embedded metadata record; the serialized form is the flat JSON
//! object the persistence layer stores as `output_json`.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PredictionMeta {
    pub model_name: String,
    pub model_version: String,
    pub preprocessing_version: String,
    pub latency_ms: u64,
    pub demo_mode: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PcgPrediction {
    pub label: String,
    pub probabilities: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub meta: PredictionMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct EcgPrediction {
    pub prediction: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub meta: PredictionMeta,
}

/// One classification head of the severity model.
#[derive(Debug, Clone, Serialize)]
pub struct SeverityHead {
    pub predicted: String,
    pub probabilities: BTreeMap<String, f64>,
}

impl SeverityHead {
    pub fn from_probs(labels: &[&str], probs: &[f64]) -> Self {
        let idx = super::labels::argmax(probs);
        Self {
            predicted: labels[idx].to_string(),
            probabilities: probability_map(labels, probs),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeverityPrediction {
    pub location: SeverityHead,
    pub timing: SeverityHead,
    pub shape: SeverityHead,
    pub grading: SeverityHead,
    pub pitch: SeverityHead,
    pub quality: SeverityHead,
    #[serde(flatten)]
    pub meta: PredictionMeta,
}

pub fn probability_map(labels: &[&str], probs: &[f64]) -> BTreeMap<String, f64> {
    labels
        .iter()
        .zip(probs.iter())
        .map(|(label, p)| (label.to_string(), *p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::labels::PCG_CLASSES;

    #[test]
    fn severity_head_picks_argmax_label() {
        let head = SeverityHead::from_probs(&PCG_CLASSES, &[0.1, 0.7, 0.2]);
        assert_eq!(head.predicted, "Murmur");
        assert_eq!(head.probabilities.len(), 3);
    }

    #[test]
    fn serialized_prediction_flattens_metadata() {
        let pred = PcgPrediction {
            label: "Normal".into(),
            probabilities: probability_map(&PCG_CLASSES, &[0.75, 0.15, 0.10]),
            meta: PredictionMeta {
                model_name: "pcg_xgboost_classifier".into(),
                model_version: "demo".into(),
                preprocessing_version: "v1.0.0".into(),
                latency_ms: 4,
                demo_mode: true,
            },
        };
        let value = serde_json::to_value(&pred).expect("serialize");
        assert_eq!(value["label"], "Normal");
        assert_eq!(value["model_version"], "demo");
        assert_eq!(value["demo_mode"], true);
        assert!(value["probabilities"]["Murmur"].as_f64().is_some());
    }
}
