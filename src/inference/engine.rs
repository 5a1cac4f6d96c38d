// src/inference/engine.rs
//! Model dispatch: signal -> preprocessor -> model (or demo rule) ->
//! labeled output with metadata.

use std::time::Instant;

use log::{info, warn};

use crate::config::ModelConfig;
use crate::core::error::{PipelineError, StartupError};
use crate::inference::demo;
use crate::inference::labels::{
    argmax, ECG_CLASSES, GRADING_CLASSES, LOCATION_CLASSES, PCG_CLASSES, PITCH_CLASSES,
    QUALITY_CLASSES, SHAPE_CLASSES, TIMING_CLASSES,
};
use crate::inference::model::{FsModelProvider, ModelProvider, ModelSet};
use crate::inference::output::{
    probability_map, EcgPrediction, PcgPrediction, PredictionMeta, SeverityHead,
    SeverityPrediction,
};
use crate::preprocess::{
    preprocessing_version, EcgWindowConfig, EcgWindowPreprocessor, PcgFeatureConfig,
    PcgFeaturePreprocessor, PcgSpectrogramConfig, PcgSpectrogramPreprocessor,
};

const PCG_MODEL_NAME: &str = "pcg_xgboost_classifier";
const SEVERITY_MODEL_NAME: &str = "murmur_severity_cnn";
const ECG_MODEL_NAME: &str = "ecg_bilstm_predictor";
const LOADED_MODEL_VERSION: &str = "v1.0.0";
const DEMO_MODEL_VERSION: &str = "demo";

pub struct InferenceEngine {
    pcg_pre: PcgFeaturePreprocessor,
    severity_pre: PcgSpectrogramPreprocessor,
    ecg_pre: EcgWindowPreprocessor,
    models: Option<ModelSet>,
}

impl InferenceEngine {
    /// Load all three models from the configured directory. A missing model
    /// activates demo mode when enabled; otherwise startup fails.
    pub fn new(cfg: &ModelConfig) -> Result<Self, StartupError> {
        let provider = FsModelProvider::new(&cfg.models_dir);
        Self::with_provider(&provider, cfg.enable_demo_mode)
    }

    pub fn with_provider(
        provider: &dyn ModelProvider,
        enable_demo_mode: bool,
    ) -> Result<Self, StartupError> {
        match provider.load() {
            Ok(models) => {
                info!("[inference] all models loaded");
                Self::build(Some(models))
            }
            Err(err) if enable_demo_mode => {
                warn!("[inference] model loading failed, activating demo mode: {err}");
                Self::build(None)
            }
            Err(err) => Err(StartupError::ModelUnavailable {
                name: err.name().to_string(),
                path: err.path().to_path_buf(),
            }),
        }
    }

    /// Build around an already-loaded model set (tests, embedded runtimes).
    pub fn with_models(models: ModelSet) -> Result<Self, StartupError> {
        Self::build(Some(models))
    }

    /// Build with no models at all: every prediction takes the demo path.
    pub fn demo() -> Result<Self, StartupError> {
        Self::build(None)
    }

    fn build(models: Option<ModelSet>) -> Result<Self, StartupError> {
        Ok(Self {
            pcg_pre: PcgFeaturePreprocessor::new(PcgFeatureConfig::default())?,
            severity_pre: PcgSpectrogramPreprocessor::new(PcgSpectrogramConfig::default()),
            ecg_pre: EcgWindowPreprocessor::new(EcgWindowConfig::default())?,
            models,
        })
    }

    pub fn demo_mode_active(&self) -> bool {
        self.models.is_none()
    }

    fn meta(&self, model_name: &str, started: Instant) -> PredictionMeta {
        let demo_mode = self.demo_mode_active();
        PredictionMeta {
            model_name: model_name.to_string(),
            model_version: if demo_mode {
                DEMO_MODEL_VERSION.to_string()
            } else {
                LOADED_MODEL_VERSION.to_string()
            },
            preprocessing_version: preprocessing_version().to_string(),
            latency_ms: started.elapsed().as_millis() as u64,
            demo_mode,
        }
    }

    /// Classify a PCG recording as Normal / Murmur / Artifact.
    pub fn predict_pcg(
        &self,
        audio: &[f32],
        sample_rate: u32,
    ) -> Result<PcgPrediction, PipelineError> {
        let started = Instant::now();
        let features = self.pcg_pre.process(audio, Some(sample_rate))?;

        let (label, probabilities) = match &self.models {
            Some(models) => {
                let probs = models
                    .pcg
                    .predict(&features)
                    .map_err(|e| PipelineError::Inference(e.to_string()))?;
                if probs.len() != PCG_CLASSES.len() {
                    return Err(PipelineError::Inference(format!(
                        "pcg model returned {} probabilities, expected {}",
                        probs.len(),
                        PCG_CLASSES.len()
                    )));
                }
                let probs: Vec<f64> = probs.into_iter().map(f64::from).collect();
                let idx = argmax(&probs);
                (
                    PCG_CLASSES[idx].to_string(),
                    probability_map(&PCG_CLASSES, &probs),
                )
            }
            None => {
                let (label, probs) = demo::pcg_rule(audio);
                (label.to_string(), probability_map(&PCG_CLASSES, &probs))
            }
        };

        let meta = self.meta(PCG_MODEL_NAME, started);
        info!(
            "[inference] pcg prediction: {} ({}ms)",
            label, meta.latency_ms
        );
        Ok(PcgPrediction {
            label,
            probabilities,
            meta,
        })
    }

    /// Murmur severity analysis across six heads. Only invoked after a
    /// Murmur classification.
    pub fn predict_murmur_severity(
        &self,
        audio: &[f32],
        sample_rate: u32,
    ) -> Result<SeverityPrediction, PipelineError> {
        let started = Instant::now();
        let spectrogram = self.severity_pre.process(audio, Some(sample_rate))?;

        let [location, timing, shape, grading, pitch, quality] = match &self.models {
            Some(models) => {
                let heads = models
                    .severity
                    .predict(&spectrogram)
                    .map_err(|e| PipelineError::Inference(e.to_string()))?;
                let label_sets: [&[&str]; 6] = [
                    &LOCATION_CLASSES,
                    &TIMING_CLASSES,
                    &SHAPE_CLASSES,
                    &GRADING_CLASSES,
                    &PITCH_CLASSES,
                    &QUALITY_CLASSES,
                ];
                let mut parsed = Vec::with_capacity(6);
                for (head, labels) in heads.iter().zip(label_sets.iter()) {
                    if head.len() != labels.len() {
                        return Err(PipelineError::Inference(format!(
                            "severity head returned {} probabilities, expected {}",
                            head.len(),
                            labels.len()
                        )));
                    }
                    let probs: Vec<f64> = head.iter().map(|&p| f64::from(p)).collect();
                    parsed.push(SeverityHead::from_probs(labels, &probs));
                }
                [
                    parsed.remove(0),
                    parsed.remove(0),
                    parsed.remove(0),
                    parsed.remove(0),
                    parsed.remove(0),
                    parsed.remove(0),
                ]
            }
            None => demo::severity_canonical(),
        };

        let meta = self.meta(SEVERITY_MODEL_NAME, started);
        info!("[inference] severity prediction completed ({}ms)", meta.latency_ms);
        Ok(SeverityPrediction {
            location,
            timing,
            shape,
            grading,
            pitch,
            quality,
            meta,
        })
    }

    /// Classify an ECG window into the five beat classes.
    pub fn predict_ecg(
        &self,
        ecg: &[f32],
        sample_rate: u32,
    ) -> Result<EcgPrediction, PipelineError> {
        let started = Instant::now();
        let window = self.ecg_pre.process(ecg, Some(sample_rate))?;

        let (prediction, confidence, probabilities) = match &self.models {
            Some(models) => {
                let probs = models
                    .ecg
                    .predict(&window)
                    .map_err(|e| PipelineError::Inference(e.to_string()))?;
                if probs.len() != ECG_CLASSES.len() {
                    return Err(PipelineError::Inference(format!(
                        "ecg model returned {} probabilities, expected {}",
                        probs.len(),
                        ECG_CLASSES.len()
                    )));
                }
                let probs: Vec<f64> = probs.into_iter().map(f64::from).collect();
                let idx = argmax(&probs);
                (
                    ECG_CLASSES[idx].to_string(),
                    probs[idx],
                    probability_map(&ECG_CLASSES, &probs),
                )
            }
            None => {
                let (label, confidence, probs) = demo::ecg_rule(ecg);
                (
                    label.to_string(),
                    confidence,
                    probability_map(&ECG_CLASSES, &probs),
                )
            }
        };

        let meta = self.meta(ECG_MODEL_NAME, started);
        info!(
            "[inference] ecg prediction: {} ({}ms)",
            prediction, meta.latency_ms
        );
        Ok(EcgPrediction {
            prediction,
            confidence,
            probabilities,
            meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::model::FsModelProvider;
    use crate::testing::mocks::{FixedEcgModel, FixedPcgModel, FixedSeverityModel};

    #[test]
    fn missing_models_with_demo_enabled_fall_back_to_demo() {
        let provider = FsModelProvider::new("/nonexistent/models");
        let engine = InferenceEngine::with_provider(&provider, true).expect("demo fallback");
        assert!(engine.demo_mode_active());
    }

    #[test]
    fn missing_models_with_demo_disabled_fail_startup() {
        let provider = FsModelProvider::new("/nonexistent/models");
        assert!(InferenceEngine::with_provider(&provider, false).is_err());
    }

    fn model_backed() -> InferenceEngine {
        InferenceEngine::with_models(ModelSet {
            pcg: Box::new(FixedPcgModel::new([0.1, 0.8, 0.1])),
            severity: Box::new(FixedSeverityModel::default()),
            ecg: Box::new(FixedEcgModel::new([0.05, 0.05, 0.8, 0.05, 0.05])),
        })
        .expect("engine")
    }

    #[test]
    fn demo_engine_flags_every_prediction() {
        let engine = InferenceEngine::demo().expect("engine");
        assert!(engine.demo_mode_active());

        let audio = vec![0.1f32; 22_050];
        let pred = engine.predict_pcg(&audio, 22_050).expect("pcg");
        assert!(pred.meta.demo_mode);
        assert_eq!(pred.meta.model_version, "demo");

        let ecg = vec![0.2f32; 1000];
        let pred = engine.predict_ecg(&ecg, 500).expect("ecg");
        assert!(pred.meta.demo_mode);
        assert_eq!(pred.meta.model_version, "demo");
    }

    #[test]
    fn model_backed_predictions_use_release_version() {
        let engine = model_backed();
        assert!(!engine.demo_mode_active());

        let audio = vec![0.1f32; 22_050];
        let pred = engine.predict_pcg(&audio, 22_050).expect("pcg");
        assert_eq!(pred.label, "Murmur");
        assert_eq!(pred.meta.model_version, "v1.0.0");
        assert!(!pred.meta.demo_mode);

        let ecg = vec![0.2f32; 1000];
        let pred = engine.predict_ecg(&ecg, 500).expect("ecg");
        assert_eq!(pred.prediction, "VEB");
        assert!((pred.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let engine = InferenceEngine::demo().expect("engine");
        let audio = vec![0.1f32; 22_050];
        let pred = engine.predict_pcg(&audio, 22_050).expect("pcg");
        let sum: f64 = pred.probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-3);
        assert!(pred.probabilities.values().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn severity_heads_cover_all_label_sets() {
        let engine = model_backed();
        let audio = vec![0.3f32; 22_050];
        let severity = engine.predict_murmur_severity(&audio, 22_050).expect("severity");
        assert_eq!(severity.location.probabilities.len(), 10);
        assert_eq!(severity.timing.probabilities.len(), 5);
        assert_eq!(severity.grading.probabilities.len(), 7);
        assert_eq!(severity.quality.probabilities.len(), 4);
    }
}
