// src/inference/model.rs
//! Model runtime seam. The engine only depends on these traits: a model
//! returns one probability vector per head, in the declared class order.
//! Swapping the backing runtime is invisible as long as that holds.

use std::path::{Path, PathBuf};

use anyhow::Result;
use ndarray::Array2;
use thiserror::Error;

pub const PCG_MODEL_FILE: &str = "pcg_classifier.onnx";
pub const SEVERITY_MODEL_FILE: &str = "murmur_severity.onnx";
pub const ECG_MODEL_FILE: &str = "ecg_predictor.onnx";

pub trait PcgModel: Send + Sync {
    /// Probabilities over the PCG classes for a 34-element feature vector.
    fn predict(&self, features: &[f32]) -> Result<Vec<f32>>;
}

pub trait SeverityModel: Send + Sync {
    /// Six head outputs: location, timing, shape, grading, pitch, quality.
    fn predict(&self, spectrogram: &Array2<f32>) -> Result<[Vec<f32>; 6]>;
}

pub trait EcgModel: Send + Sync {
    /// Probabilities over the ECG beat classes for one window.
    fn predict(&self, window: &[f32]) -> Result<Vec<f32>>;
}

pub struct ModelSet {
    pub pcg: Box<dyn PcgModel>,
    pub severity: Box<dyn SeverityModel>,
    pub ecg: Box<dyn EcgModel>,
}

impl std::fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSet").finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact '{name}' not found at {path}")]
    Missing { name: &'static str, path: PathBuf },
    #[error("no inference runtime bound for '{name}' at {path}")]
    RuntimeUnbound { name: &'static str, path: PathBuf },
}

impl ModelLoadError {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Missing { name, .. } | Self::RuntimeUnbound { name, .. } => name,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Missing { path, .. } | Self::RuntimeUnbound { path, .. } => path,
        }
    }
}

pub trait ModelProvider {
    fn load(&self) -> Result<ModelSet, ModelLoadError>;
}

/// Default provider: checks the model artifacts on disk. Binding an actual
/// runtime means implementing [`ModelProvider`] (or the three model traits)
/// on top of it; this build ships without one, so deployments either mount
/// a provider or run in demo mode.
pub struct FsModelProvider {
    models_dir: PathBuf,
}

impl FsModelProvider {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }
}

impl ModelProvider for FsModelProvider {
    fn load(&self) -> Result<ModelSet, ModelLoadError> {
        for (name, file) in [
            ("pcg_classifier", PCG_MODEL_FILE),
            ("murmur_severity", SEVERITY_MODEL_FILE),
            ("ecg_predictor", ECG_MODEL_FILE),
        ] {
            let path = self.models_dir.join(file);
            if !path.exists() {
                return Err(ModelLoadError::Missing { name, path });
            }
        }
        // Artifacts are present but no runtime is compiled into this build.
        Err(ModelLoadError::RuntimeUnbound {
            name: "pcg_classifier",
            path: self.models_dir.join(PCG_MODEL_FILE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifacts_are_reported_by_name() {
        let provider = FsModelProvider::new("/nonexistent/models");
        let err = provider.load().expect_err("must fail");
        assert_eq!(err.name(), "pcg_classifier");
        assert!(matches!(err, ModelLoadError::Missing { .. }));
    }
}
